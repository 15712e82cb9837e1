//! Core identity types for enlist
//!
//! This module defines:
//! - ParticipantId: arena-issued identity token for a transaction participant
//! - Depth: nesting depth of a transaction level

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of participant ids for the whole process.
///
/// Starts at 1 so that a zeroed id never aliases a live participant.
static NEXT_PARTICIPANT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token for one transaction participant
///
/// A participant obtains its id once, when it is constructed, and presents
/// the same id every time it enlists. Transaction levels key their
/// bookkeeping by this id, so two participants are "the same" exactly when
/// their ids are equal. Ids carry no structure beyond identity.
///
/// # Example
///
/// ```
/// use enlist_core::ParticipantId;
///
/// let a = ParticipantId::next();
/// let b = ParticipantId::next();
/// assert_ne!(a, b);
/// assert_eq!(a, a);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(u64);

impl ParticipantId {
    /// Issue a fresh id, unique for the lifetime of the process
    pub fn next() -> Self {
        Self(NEXT_PARTICIPANT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw arena index of this id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant#{}", self.0)
    }
}

/// Nesting depth of a transaction level (0 = outermost)
pub type Depth = usize;
