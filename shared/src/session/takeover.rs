//! Ownership-transfer proposals

use crate::util::now_millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TakeoverStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

/// A pending ownership-transfer proposal.
///
/// `current_owner` is snapshotted at request time: only that worker may
/// respond, even if the session changes hands through other means first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TakeoverRequest {
    pub id: String,
    pub session_id: String,
    pub requested_by: String,
    /// Session owner at request time
    pub current_owner: String,
    pub requested_at: i64,
    pub status: TakeoverStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<i64>,
}

impl TakeoverRequest {
    pub fn new(
        session_id: impl Into<String>,
        requested_by: impl Into<String>,
        current_owner: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::util::takeover_id(),
            session_id: session_id.into(),
            requested_by: requested_by.into(),
            current_owner: current_owner.into(),
            requested_at: now_millis(),
            status: TakeoverStatus::Pending,
            responded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TakeoverStatus::Pending
    }

    /// Resolve the request, stamping the response time.
    pub fn resolve(&mut self, accept: bool) {
        self.status = if accept {
            TakeoverStatus::Accepted
        } else {
            TakeoverStatus::Declined
        };
        self.responded_at = Some(now_millis());
    }
}
