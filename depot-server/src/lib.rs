//! Depot Server - order fulfillment session engine
//!
//! The core that creates, owns, transitions, and reconciles pick/pack
//! sessions against invoice line items: single-owner-at-a-time access,
//! negotiated ownership handoff, and cascading inventory deduction across
//! physical stock pools.
//!
//! # Module structure
//!
//! ```text
//! depot-server/src/
//! ├── core/          # Config, logging setup
//! ├── gateway/       # Invoice gateway + SKU resolver (external lookups)
//! ├── sessions/      # Session store (redb) + lifecycle manager + archival
//! ├── scan/          # Scan reconciliation
//! ├── inventory/     # Pool store contract + cascade deduction
//! ├── takeover/      # Ownership-transfer coordination
//! └── notify/        # Outbound notification queue + worker
//! ```

pub mod core;
pub mod gateway;
pub mod inventory;
pub mod notify;
pub mod scan;
pub mod sessions;
pub mod takeover;

// Re-export public types
pub use core::{Config, setup_environment};
pub use gateway::{HttpInvoiceGateway, HttpSkuResolver, InvoiceGateway, SkuResolver};
pub use inventory::{MemoryPoolStore, PoolStore};
pub use notify::{LogEmitter, NotificationEmitter, NotificationWorker, Notifier};
pub use scan::ScanRequest;
pub use sessions::{RedbSessionStore, SessionManager, SessionStore};
pub use takeover::TakeoverCoordinator;

// Re-export domain types from shared
pub use shared::{EngineError, EngineResult, Session, SessionNotification, SessionStatus};
