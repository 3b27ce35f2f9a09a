//! The session record and its state machine representation
//!
//! Status and ownership are a single tagged union: each variant carries only
//! the fields valid in that state, so "completed session with an owner" or
//! "in-progress session without one" cannot be constructed.

use super::types::{AuditAction, AuditEntry, ExpectedItem, ScannedEntry, SessionKind, SessionStatus};
use crate::util::now_millis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Session state - tagged union of status plus the fields valid in it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Created but unowned; claimable by any worker
    Draft,
    /// Supervisor pre-approved, still unowned
    Approved { approved_by: String, approved_at: i64 },
    /// Owned and actively being picked
    InProgress { owner: String },
    /// Picking done, awaiting independent verification
    ReadyToCheck { owner: String },
    /// Terminal
    Completed {
        completed_by: String,
        completed_at: i64,
        forced: bool,
    },
    /// Terminal but restartable
    Cancelled {
        cancelled_by: String,
        cancelled_at: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Draft => SessionStatus::Draft,
            SessionState::Approved { .. } => SessionStatus::Approved,
            SessionState::InProgress { .. } => SessionStatus::InProgress,
            SessionState::ReadyToCheck { .. } => SessionStatus::ReadyToCheck,
            SessionState::Completed { .. } => SessionStatus::Completed,
            SessionState::Cancelled { .. } => SessionStatus::Cancelled,
        }
    }

    /// Owner is defined only while the session is actively held.
    pub fn owner(&self) -> Option<&str> {
        match self {
            SessionState::InProgress { owner } | SessionState::ReadyToCheck { owner } => {
                Some(owner.as_str())
            }
            _ => None,
        }
    }
}

/// One pick/pack/return effort against one invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Opaque unique id, generated at creation
    pub id: String,
    /// External invoice identifier (immutable)
    pub invoice_ref: String,
    /// External order identifier (immutable)
    pub order_ref: String,
    pub kind: SessionKind,
    pub state: SessionState,
    pub created_by: String,
    pub created_at: i64,
    pub last_modified_by: String,
    pub last_modified_at: i64,
    /// Line items from the invoice, fixed at creation
    pub items_expected: Vec<ExpectedItem>,
    /// sku -> accumulated scan progress; keys are always a subset of the
    /// expected skus (in their invoice casing)
    #[serde(default)]
    pub items_scanned: BTreeMap<String, ScannedEntry>,
    /// Append-only; cleared only by full archival reset
    #[serde(default)]
    pub audit_log: Vec<AuditEntry>,
}

impl Session {
    /// Create a new session in the given state.
    pub fn new(
        invoice_ref: impl Into<String>,
        order_ref: impl Into<String>,
        kind: SessionKind,
        state: SessionState,
        items_expected: Vec<ExpectedItem>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        let created_by = created_by.into();
        Self {
            id: crate::util::session_id(),
            invoice_ref: invoice_ref.into(),
            order_ref: order_ref.into(),
            kind,
            state,
            created_by: created_by.clone(),
            created_at: now,
            last_modified_by: created_by,
            last_modified_at: now,
            items_expected,
            items_scanned: BTreeMap::new(),
            audit_log: Vec::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn owner(&self) -> Option<&str> {
        self.state.owner()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Completion timestamp, defined only for completed sessions.
    pub fn completed_at(&self) -> Option<i64> {
        match &self.state {
            SessionState::Completed { completed_at, .. } => Some(*completed_at),
            _ => None,
        }
    }

    /// Case-insensitive lookup of an expected line item.
    pub fn expected_item(&self, sku: &str) -> Option<&ExpectedItem> {
        self.items_expected
            .iter()
            .find(|item| item.sku.eq_ignore_ascii_case(sku))
    }

    /// Accumulated scanned quantity for a SKU (0 if never scanned).
    pub fn scanned_qty(&self, sku: &str) -> u32 {
        self.expected_item(sku)
            .and_then(|item| self.items_scanned.get(&item.sku))
            .map(|entry| entry.qty_scanned)
            .unwrap_or(0)
    }

    /// Accumulate a scan against an expected SKU, returning the new total.
    ///
    /// The key is stored in the invoice's casing so `items_scanned` stays a
    /// subset of the expected skus. Accumulation adds, saturating at
    /// `u32::MAX`, so two scans of 2 and 3 land identically to one scan
    /// of 5.
    pub fn record_scan(&mut self, sku: &str, quantity: u32, at: i64) -> Option<u32> {
        let canonical = self.expected_item(sku)?.sku.clone();
        let entry = self.items_scanned.entry(canonical).or_default();
        entry.qty_scanned = entry.qty_scanned.saturating_add(quantity);
        entry.last_scan_at = at;
        Some(entry.qty_scanned)
    }

    /// True when every expected item has been scanned to at least its
    /// expected quantity.
    pub fn all_items_complete(&self) -> bool {
        self.items_expected
            .iter()
            .all(|item| self.scanned_qty(&item.sku) >= item.qty_expected)
    }

    /// Expected items still short of their quantity, with the shortfall.
    pub fn missing_items(&self) -> Vec<(&ExpectedItem, u32)> {
        self.items_expected
            .iter()
            .filter_map(|item| {
                let scanned = self.scanned_qty(&item.sku);
                (scanned < item.qty_expected).then(|| (item, item.qty_expected - scanned))
            })
            .collect()
    }

    /// Discard all scan progress (cancel / restart paths).
    pub fn clear_scans(&mut self) {
        self.items_scanned.clear();
    }

    /// Stamp the last-modified fields.
    pub fn touch(&mut self, actor: &str) {
        self.last_modified_by = actor.to_string();
        self.last_modified_at = now_millis();
    }

    /// Append one audit entry.
    pub fn push_audit(&mut self, action: AuditAction, actor: &str, detail: Option<String>) {
        self.audit_log.push(AuditEntry {
            timestamp: now_millis(),
            action,
            actor: actor.to_string(),
            detail,
        });
    }
}
