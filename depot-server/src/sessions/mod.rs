//! Session persistence and lifecycle
//!
//! - **storage**: `SessionStore` trait and the redb implementation
//! - **manager**: the lifecycle manager, sole entry point for mutations
//! - **locks**: per-session-id mutation locks

pub mod locks;
pub mod manager;
pub mod storage;

pub use locks::SessionLocks;
pub use manager::SessionManager;
pub use storage::{RedbSessionStore, SessionStore, StorageError};
