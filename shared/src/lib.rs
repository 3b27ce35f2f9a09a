//! Shared types for the depot fulfillment engine
//!
//! Common types used across crates: session and takeover records, invoice
//! wire types, inventory pool types, notification payloads, the engine
//! error taxonomy, and small utilities.

pub mod error;
pub mod invoice;
pub mod inventory;
pub mod notify;
pub mod session;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{EngineError, EngineResult};
pub use notify::SessionNotification;
pub use session::{Session, SessionKind, SessionState, SessionStatus};
