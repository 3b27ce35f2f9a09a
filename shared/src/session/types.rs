//! Shared types for fulfillment sessions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Session kind - what the worker is doing against the invoice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    /// Picking/packing items for an outbound order
    #[default]
    Pick,
    /// Processing returned items back into stock
    Return,
}

/// Session status - projection of `SessionState` used for indexing and display
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Draft,
    Approved,
    InProgress,
    ReadyToCheck,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Completed and cancelled sessions accept no normal transitions
    /// (cancelled is still restartable via the explicit restart operation).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Stable string form, used as the status index key in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "DRAFT",
            SessionStatus::Approved => "APPROVED",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::ReadyToCheck => "READY_TO_CHECK",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One invoice line item the session is expected to fulfill.
///
/// Fixed at session creation from the invoice; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpectedItem {
    pub sku: String,
    pub name: String,
    pub qty_expected: u32,
    pub unit_price: Decimal,
}

/// Accumulated scan progress for one SKU.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScannedEntry {
    pub qty_scanned: u32,
    pub last_scan_at: i64,
}

/// Audit action tags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SessionStarted,
    SessionClaimed,
    SessionReleased,
    SessionApproved,
    SessionMarkedReady,
    SessionCompleted,
    SessionCancelled,
    SessionRestarted,
    SessionForceCancelled,
    SessionForceAssigned,
    ItemScanned,
    DeductionFailed,
    TakeoverRequested,
    TakeoverAccepted,
    TakeoverDeclined,
}

/// One append-only audit entry on a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub timestamp: i64,
    pub action: AuditAction,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
