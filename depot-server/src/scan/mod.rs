//! Scan identifier classification
//!
//! A scanned string is either a raw invoice SKU or a warehouse item code
//! (scale/label barcode). Item codes are all digits, at least 15 characters,
//! and start with the `2` variable-measure prefix; everything else is
//! treated as a SKU and matched against the invoice case-insensitively.

use serde::Deserialize;
use shared::inventory::PoolHint;

pub const ITEM_CODE_MIN_LEN: usize = 15;
pub const ITEM_CODE_SENTINEL: char = '2';

/// A classified scan input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanIdentifier {
    /// Warehouse item code needing catalog resolution to a SKU
    ItemCode(String),
    /// Raw SKU, matched directly against the invoice lines
    Sku(String),
}

impl ScanIdentifier {
    /// The underlying stock key: the code itself for item codes, the SKU
    /// otherwise.
    pub fn stock_key(&self) -> &str {
        match self {
            ScanIdentifier::ItemCode(code) | ScanIdentifier::Sku(code) => code,
        }
    }
}

/// Classify one scanned identifier. Input is trimmed first.
pub fn classify_identifier(raw: &str) -> ScanIdentifier {
    let trimmed = raw.trim();
    let looks_like_code = trimmed.len() >= ITEM_CODE_MIN_LEN
        && trimmed.starts_with(ITEM_CODE_SENTINEL)
        && trimmed.chars().all(|c| c.is_ascii_digit());
    if looks_like_code {
        ScanIdentifier::ItemCode(trimmed.to_string())
    } else {
        ScanIdentifier::Sku(trimmed.to_string())
    }
}

/// One scan submission against an in-progress session.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    /// Raw scanned string, SKU or item code
    pub identifier: String,
    pub quantity: u32,
    /// Which pool to draw the deduction from
    #[serde(default)]
    pub pool_hint: PoolHint,
}

impl ScanRequest {
    pub fn new(identifier: impl Into<String>, quantity: u32) -> Self {
        Self {
            identifier: identifier.into(),
            quantity,
            pool_hint: PoolHint::Auto,
        }
    }

    pub fn with_pool_hint(mut self, hint: PoolHint) -> Self {
        self.pool_hint = hint;
        self
    }
}
