//! Core types for enlist
//!
//! This crate defines the foundational types used throughout the system:
//! - ParticipantId: identity token a participant enlists under
//! - Depth: nesting depth of a transaction level
//! - TransactionError: invariant violations of the coordinator
//! - ConfigError: configuration loading failures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{ConfigError, Result, TransactionError};
pub use types::{Depth, ParticipantId};
