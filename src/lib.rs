//! Enlist - nested transactions for in-process participants
//!
//! Participants (caches, in-memory models, anything with pending changes)
//! enlist in the innermost open transaction and are told, when it closes,
//! whether it committed or rolled back.
//!
//! # Quick Start
//!
//! ```
//! use enlist::{SnapshotCell, TransactionManager};
//!
//! let manager = TransactionManager::new();
//! let balance = SnapshotCell::new(100i64);
//!
//! let mut txn = manager.open();
//! balance.update(&txn, |b| *b -= 30).unwrap();
//! txn.commit().unwrap();
//!
//! // Dropping without commit rolls back
//! {
//!     let txn = manager.open();
//!     balance.update(&txn, |b| *b -= 1000).unwrap();
//! }
//! assert_eq!(balance.get(), 70);
//! ```
//!
//! # Architecture
//!
//! - `enlist-core`: identifiers and error types
//! - `enlist-concurrency`: the manager, levels, locks and participants
//!
//! Everything needed by callers is re-exported here.

pub use enlist_concurrency::*;
pub use enlist_core::{ConfigError, Depth, ParticipantId, Result, TransactionError};
