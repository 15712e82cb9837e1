//! Per-participant transaction context
//!
//! A `TransactionContext` is handed to a participant twice per level: once
//! when it enlists and once when its completion callback runs. Both times it
//! is scoped to that participant and that level, so `get_state` and
//! `set_state` only ever see the participant's own slot.
//!
//! Contexts are borrowed for the duration of a single call and cannot
//! outlive it.

use crate::manager::Shared;
use crate::participant::CompletionFn;
use crate::validation::validate_parent;
use enlist_core::{Depth, ParticipantId, Result};
use std::fmt;
use std::marker::PhantomData;

/// Handle given to a participant at enlistment and completion
pub struct TransactionContext<'a> {
    shared: &'a Shared,
    depth: Depth,
    participant: ParticipantId,
    committed: bool,
    /// State accessors assume the inner lock is held by the calling thread
    _not_send: PhantomData<*const ()>,
}

impl<'a> TransactionContext<'a> {
    pub(crate) fn new(
        shared: &'a Shared,
        depth: Depth,
        participant: ParticipantId,
        committed: bool,
    ) -> Self {
        TransactionContext {
            shared,
            depth,
            participant,
            committed,
            _not_send: PhantomData,
        }
    }

    /// Participant this context is scoped to
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Depth of the level this context belongs to
    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// Whether the closing level committed
    ///
    /// Constant for the whole close: every callback of one close observes
    /// the same answer. Always `false` during enlistment.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Clone of the state this participant stored at this level
    ///
    /// Returns `None` if nothing is stored or it is not a `T`.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        let stack = self.shared.stack.lock();
        stack
            .level(self.depth)?
            .state(self.participant)?
            .downcast_ref::<T>()
            .cloned()
    }

    /// Store state for this participant at this level, replacing any previous value
    pub fn set_state<T: Send + 'static>(&self, value: T) {
        let mut stack = self.shared.stack.lock();
        if let Some(level) = stack.level_mut(self.depth) {
            level.set_state(self.participant, Box::new(value));
        }
    }

    /// Remove and return the state this participant stored at this level
    ///
    /// State of a different type is left in place and `None` is returned.
    pub fn take_state<T: Send + 'static>(&self) -> Option<T> {
        let mut stack = self.shared.stack.lock();
        let level = stack.level_mut(self.depth)?;
        let boxed = level.take_state(self.participant)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                level.set_state(self.participant, other);
                None
            }
        }
    }

    /// Whether any state is stored for this participant at this level
    pub fn has_state(&self) -> bool {
        let stack = self.shared.stack.lock();
        matches!(
            stack.level(self.depth),
            Some(level) if level.state(self.participant).is_some()
        )
    }

    /// Enlist `id` in the level directly enclosing the closing one
    ///
    /// Only valid from a completion callback of the innermost level while it
    /// closes. This lets a participant carry a committed nested change up
    /// to the enclosing level so that a later rollback there can still undo
    /// it. `factory` runs with a context scoped to the parent level.
    ///
    /// Returns `Ok(false)` if `id` was already enlisted in the parent.
    ///
    /// # Errors
    /// `UseAfterClose` if this level has no open parent,
    /// `NonInnermostAccess` if this level is not the one currently closing,
    /// `ForeignThreadAccess` if called off the transaction's thread.
    pub fn enlist_in_parent<F>(&self, id: ParticipantId, factory: F) -> Result<bool>
    where
        F: FnOnce(&TransactionContext<'_>) -> CompletionFn,
    {
        let closing = self.depth;
        self.shared
            .enlist_with(id, factory, |stack, inner| validate_parent(stack, closing, inner))
    }
}

impl fmt::Debug for TransactionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("depth", &self.depth)
            .field("participant", &self.participant)
            .field("committed", &self.committed)
            .finish()
    }
}
