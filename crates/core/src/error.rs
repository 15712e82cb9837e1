//! Error types for enlist
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! `TransactionError` is the invariant-violation taxonomy of the coordinator.
//! Every variant is a caller bug, never an ordinary outcome: none of them is
//! retried or swallowed inside the crate.

use crate::types::Depth;
use std::io;
use thiserror::Error;

/// Result type alias for transaction operations
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Invariant violations detected on a mutating transaction call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The level was already committed, rolled back or closed
    ///
    /// Also reported for a stale handle whose slot has since been reused
    /// by a later `open()`.
    #[error("Transaction at depth {depth} is closed")]
    UseAfterClose {
        /// Depth the handle was opened at
        depth: Depth,
    },

    /// A level other than the innermost open one was used
    ///
    /// Nesting is strictly LIFO: an outer level cannot be touched while an
    /// inner level is still open.
    #[error("Transaction at depth {depth} is not the innermost open transaction (innermost: {innermost:?})")]
    NonInnermostAccess {
        /// Depth of the level that was used
        depth: Depth,
        /// Depth of the level that is actually innermost, if any
        innermost: Option<Depth>,
    },

    /// The calling thread does not hold the transaction lock
    #[error("Transaction at depth {depth} accessed from a thread that does not hold it")]
    ForeignThreadAccess {
        /// Depth of the level that was used
        depth: Depth,
    },
}

impl TransactionError {
    /// Depth of the level the failed call targeted
    pub fn depth(&self) -> Depth {
        match self {
            TransactionError::UseAfterClose { depth }
            | TransactionError::NonInnermostAccess { depth, .. }
            | TransactionError::ForeignThreadAccess { depth } => *depth,
        }
    }
}

/// Errors raised while loading manager configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("I/O error on config file: {0}")]
    Io(#[from] io::Error),

    /// Config text is not valid TOML for the expected schema
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// Config parsed but holds an unusable value
    #[error("Invalid config value for '{field}': {reason}")]
    InvalidValue {
        /// Offending field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}
