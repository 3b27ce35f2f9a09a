//! State-change notification payloads
//!
//! Published after a successful persist; consumed by the notification worker
//! and any in-process subscribers. Fire-and-forget by contract.

use crate::session::SessionStatus;
use serde::{Deserialize, Serialize};

/// What changed, for fan-out to displays and handheld terminals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    Started,
    Claimed,
    Released,
    Approved,
    MarkedReady,
    Completed,
    Cancelled,
    Restarted,
    ForceCancelled,
    ForceAssigned,
    ItemScanned,
    TakeoverRequested,
    TakeoverAccepted,
    TakeoverDeclined,
}

/// One state-change event for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionNotification {
    pub session_id: String,
    pub invoice_ref: String,
    pub status: SessionStatus,
    pub event: SessionEvent,
    /// Actor that caused the change
    pub actor: String,
    /// Worker who should be told directly (e.g. a dispossessed owner)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub timestamp: i64,
}

impl SessionNotification {
    pub fn new(
        session_id: impl Into<String>,
        invoice_ref: impl Into<String>,
        status: SessionStatus,
        event: SessionEvent,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            invoice_ref: invoice_ref.into(),
            status,
            event,
            actor: actor.into(),
            target: None,
            timestamp: crate::util::now_millis(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}
