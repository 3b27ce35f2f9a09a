//! Engine error taxonomy
//!
//! `StateConflict` and `AccessDenied` are expected, recoverable outcomes:
//! they carry the current status/owner so a caller can offer the worker a
//! claim, a wait, or a cancel instead of a generic failure screen.

use crate::session::SessionStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State conflict: {message}")]
    StateConflict {
        status: SessionStatus,
        owner: Option<String>,
        message: String,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Insufficient stock for {item_code}: requested {requested}, available {available}")]
    InsufficientStock {
        item_code: String,
        requested: u32,
        available: u32,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    pub fn state_conflict(
        status: SessionStatus,
        owner: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        EngineError::StateConflict {
            status,
            owner,
            message: message.into(),
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        EngineError::AccessDenied(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        EngineError::Storage(message.to_string())
    }

    /// True for outcomes a calling surface should present as a user-facing
    /// choice rather than a failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::StateConflict { .. } | EngineError::AccessDenied(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
