//! Nested transaction coordination for enlist
//!
//! This crate lets independent participants register pending changes
//! during a unit of work and then commit or roll all of them back together:
//! - TransactionManager: stack of nesting levels behind a two-tier lock
//! - Transaction / TransactionRef: scoped guard and handle for one level
//! - TransactionContext: per-participant state during enlistment and close
//! - TransactionParticipant: the enlistment interface
//! - SnapshotCell: a participant that rolls back by restoring a snapshot
//! - ManagerConfig: `enlist.toml` configuration
//!
//! # Locking
//!
//! One thread at a time may have transactions open. A designated owner
//! thread skips the queue the other threads wait in, but still waits for
//! whichever thread currently has a transaction open.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod manager;
pub mod participant;
pub mod snapshot;
pub mod transaction;

mod level;
mod lock;
mod validation;

pub use config::{ManagerConfig, CONFIG_FILE_NAME, MAX_INITIAL_DEPTH};
pub use context::TransactionContext;
pub use manager::{ManagerStats, TransactionManager};
pub use participant::{completion, CompletionFn, TransactionParticipant};
pub use snapshot::SnapshotCell;
pub use transaction::{Transaction, TransactionRef};

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(TransactionManager: Send, Sync, Clone);
    static_assertions::assert_impl_all!(TransactionRef: Send, Sync, Clone);
    static_assertions::assert_not_impl_any!(Transaction: Send, Sync);
    static_assertions::assert_not_impl_any!(TransactionContext<'static>: Send, Sync);
}
