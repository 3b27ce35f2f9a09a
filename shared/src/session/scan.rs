//! Scan reconciliation result types

use serde::{Deserialize, Serialize};

/// What happened to the scan-triggered inventory deduction.
///
/// A scan is committed before stock is touched; a deduction that cannot be
/// satisfied is reported here (and audited) instead of rolling the scan back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeductionStatus {
    Applied,
    /// No item code is known for the SKU, so no pool was touched.
    Skipped,
    Failed { reason: String },
}

/// Result of one scan against a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanOutcome {
    /// SKU the identifier resolved to (invoice casing)
    pub sku: String,
    pub name: String,
    pub qty_expected: u32,
    /// Accumulated total after this scan
    pub qty_scanned: u32,
    /// max(0, expected - scanned)
    pub qty_remaining: u32,
    /// scanned >= expected
    pub is_complete: bool,
    /// scanned > expected
    pub is_overpicked: bool,
    /// Every expected item on the session has reached its quantity
    pub all_items_complete: bool,
    pub deduction: DeductionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduction_status_serde_tags() {
        let applied = serde_json::to_value(DeductionStatus::Applied).unwrap();
        assert_eq!(applied["result"], "APPLIED");

        let failed = serde_json::to_value(DeductionStatus::Failed {
            reason: "short".to_string(),
        })
        .unwrap();
        assert_eq!(failed["result"], "FAILED");
        assert_eq!(failed["reason"], "short");
    }
}
