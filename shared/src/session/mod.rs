//! Fulfillment session domain types
//!
//! - **session**: the `Session` record and its `SessionState` tagged union
//! - **types**: expected/scanned item types and the audit trail
//! - **takeover**: ownership-transfer proposals
//! - **scan**: scan reconciliation result types

mod scan;
mod session;
mod takeover;
mod types;

pub use scan::{DeductionStatus, ScanOutcome};
pub use session::{Session, SessionState};
pub use takeover::{TakeoverRequest, TakeoverStatus};
pub use types::{AuditAction, AuditEntry, ExpectedItem, ScannedEntry, SessionKind, SessionStatus};
