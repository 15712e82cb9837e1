//! Transaction levels: the scoped guard and the borrowed handle
//!
//! [`Transaction`] is the guard returned by `TransactionManager::open()`.
//! It owns one nesting level and the lock holds taken for it, and gives
//! them back when the level is committed, rolled back or dropped.
//!
//! [`TransactionRef`] is a plain handle to a level, as returned by
//! `TransactionManager::current()`. It can enlist participants but cannot
//! close the level. Every guard dereferences to its handle.
//!
//! ## Close Sequence
//!
//! ```text
//! 1. Validate (open, innermost, lock held by caller)
//! 2. Mark the level closing and record commit/rollback
//! 3. Run every completion callback in enlistment order
//! 4. Clear participants and state, keeping allocations for reuse
//! 5. Pop the level
//! 6. Release the inner lock, then the outer lock if it was taken;
//!    a non-owner root close yields the processor once
//! ```
//!
//! Callbacks in step 3 run with the lock still held. A callback may open,
//! use and close deeper levels before returning; those go above the
//! closing level and leave it untouched.

use crate::context::TransactionContext;
use crate::manager::Shared;
use crate::level::Phase;
use crate::participant::{CompletionFn, TransactionParticipant};
use crate::validation::validate_level;
use enlist_core::{Depth, ParticipantId, Result};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use std::thread;

/// Handle to one transaction level
///
/// Handles are cheap to clone and may be sent between threads, but every
/// mutating call is validated: it fails with `ForeignThreadAccess` off the
/// thread that opened the level, `NonInnermostAccess` while a deeper level
/// is open, and `UseAfterClose` once the level has closed (even if its slot
/// was reused by a later `open()`).
#[derive(Clone)]
pub struct TransactionRef {
    shared: Arc<Shared>,
    depth: Depth,
    generation: u64,
}

impl TransactionRef {
    pub(crate) fn new(shared: Arc<Shared>, depth: Depth, generation: u64) -> Self {
        TransactionRef {
            shared,
            depth,
            generation,
        }
    }

    /// Nesting depth of this level (0 = outermost)
    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// Whether this level is still open and accepting enlistments
    pub fn is_open(&self) -> bool {
        let stack = self.shared.stack.lock();
        matches!(
            stack.live_level(self.depth, self.generation),
            Some(level) if level.phase == Phase::Open
        )
    }

    /// Number of participants enlisted at this level so far
    pub fn participant_count(&self) -> usize {
        let stack = self.shared.stack.lock();
        stack
            .live_level(self.depth, self.generation)
            .map_or(0, |level| level.participant_count())
    }

    /// Enlist a participant in this level
    ///
    /// On the participant's first enlistment here, its
    /// [`on_enlist`](TransactionParticipant::on_enlist) runs and the
    /// returned callback is queued behind those already enlisted. Further
    /// enlistments of the same participant at this level do nothing.
    ///
    /// Returns the participant, for chaining.
    ///
    /// # Errors
    /// Any of the three validation errors; see [`TransactionRef`].
    pub fn enlist<'p, P>(&self, participant: &'p P) -> Result<&'p P>
    where
        P: TransactionParticipant + ?Sized,
    {
        self.enlist_with(participant.participant_id(), |ctx| {
            participant.on_enlist(ctx)
        })?;
        Ok(participant)
    }

    /// Enlist `id` with an explicit callback factory
    ///
    /// Lower-level form of [`enlist`](Self::enlist) for callers that are
    /// not a [`TransactionParticipant`]. `factory` only runs if `id` is not
    /// enlisted yet.
    ///
    /// Returns `true` if `id` was newly enlisted.
    pub fn enlist_with<F>(&self, id: ParticipantId, factory: F) -> Result<bool>
    where
        F: FnOnce(&TransactionContext<'_>) -> CompletionFn,
    {
        let (depth, generation) = (self.depth, self.generation);
        self.shared.enlist_with(id, factory, |stack, inner| {
            validate_level(stack, depth, generation, inner).map(|()| depth)
        })
    }
}

impl fmt::Debug for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRef")
            .field("depth", &self.depth)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Scoped guard for one open transaction level
///
/// Obtained from [`TransactionManager::open`](crate::TransactionManager::open).
/// Call [`commit`](Self::commit) to keep the changes of every enlisted
/// participant; anything else (an explicit [`rollback`](Self::rollback),
/// [`close`](Self::close), or just dropping the guard) rolls them back.
///
/// Guards stay on the thread that opened them (`Transaction` is not `Send`)
/// and must be closed innermost first; Rust's drop order does this for
/// guards held in nested scopes.
///
/// # Panics
///
/// Dropping a guard whose level is still open but is no longer the
/// innermost one (an inner guard was leaked) panics, since that drop cannot
/// report the error any other way.
pub struct Transaction {
    handle: TransactionRef,
    /// Whether `open()` took the outer lock for this level
    took_outer: bool,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl Transaction {
    pub(crate) fn new(handle: TransactionRef, took_outer: bool) -> Self {
        Transaction {
            handle,
            took_outer,
            finished: false,
            _not_send: PhantomData,
        }
    }

    /// A sharable handle to this level
    pub fn handle(&self) -> TransactionRef {
        self.handle.clone()
    }

    /// Close the level, telling every participant it committed
    ///
    /// # Errors
    /// `UseAfterClose` if already closed, `NonInnermostAccess` if a deeper
    /// level is still open. The guard is left untouched on error.
    pub fn commit(&mut self) -> Result<()> {
        self.finish(true)
    }

    /// Close the level, telling every participant it rolled back
    ///
    /// # Errors
    /// As for [`commit`](Self::commit).
    pub fn rollback(&mut self) -> Result<()> {
        self.finish(false)
    }

    /// Close the guard: roll back if still open, otherwise do nothing
    ///
    /// # Errors
    /// `NonInnermostAccess` if a deeper level is still open. The level stays
    /// open and the guard can be closed again once the deeper level is gone.
    pub fn close(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finish(false)
    }

    fn finish(&mut self, committed: bool) -> Result<()> {
        let shared = Arc::clone(&self.handle.shared);
        let depth = self.handle.depth;

        let mut enlisted = {
            let mut stack = shared.stack.lock();
            validate_level(&stack, depth, self.handle.generation, &shared.inner)?;
            match stack.level_mut(depth) {
                Some(level) => level.begin_close(),
                None => Vec::new(),
            }
        };

        tracing::trace!(
            depth,
            committed,
            participants = enlisted.len(),
            thread = ?thread::current().id(),
            "closing transaction"
        );
        for enlistment in enlisted.drain(..) {
            let ctx = TransactionContext::new(&shared, depth, enlistment.id, committed);
            (enlistment.on_close)(&ctx);
        }

        let root = {
            let mut stack = shared.stack.lock();
            if let Some(level) = stack.level_mut(depth) {
                level.reset(enlisted);
            }
            stack.pop(depth)
        };

        self.finished = true;
        shared.stats.record_close(committed);
        self.release_locks(root);
        Ok(())
    }

    /// Drop the level without running callbacks
    ///
    /// Used when a completion callback panicked part way through a close.
    fn discard(&mut self) {
        let shared = Arc::clone(&self.handle.shared);
        let depth = self.handle.depth;

        let root = {
            let mut stack = shared.stack.lock();
            if let Some(level) = stack.level_mut(depth) {
                level.reset(Vec::new());
            }
            stack.pop(depth)
        };

        self.finished = true;
        shared.stats.record_close(false);
        tracing::warn!(depth, "transaction discarded after a panic during close");
        self.release_locks(root);
    }

    fn release_locks(&self, root: bool) {
        let shared = &self.handle.shared;
        shared.inner.release();
        if self.took_outer {
            shared.outer.release();
            if root && shared.config.yield_on_root_close {
                thread::yield_now();
            }
        }
        if root {
            tracing::debug!(owner = !self.took_outer, "root transaction closed");
        }
    }

    fn phase(&self) -> Option<Phase> {
        let stack = self.handle.shared.stack.lock();
        stack
            .live_level(self.handle.depth, self.handle.generation)
            .map(|level| level.phase)
    }
}

impl Deref for Transaction {
    type Target = TransactionRef;

    fn deref(&self) -> &TransactionRef {
        &self.handle
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        match self.phase() {
            Some(Phase::Open) => {
                if thread::panicking() {
                    tracing::warn!(depth = self.handle.depth, "rolling back transaction during unwind");
                }
                if let Err(e) = self.finish(false) {
                    tracing::error!(depth = self.handle.depth, error = %e, "transaction dropped out of order");
                    if !thread::panicking() {
                        panic!("failed to roll back dropped transaction: {}", e);
                    }
                }
            }
            Some(Phase::Closing) => self.discard(),
            Some(Phase::Idle) | None => {}
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("depth", &self.handle.depth)
            .field("finished", &self.finished)
            .finish()
    }
}
