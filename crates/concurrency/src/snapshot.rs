//! Snapshot-based participant
//!
//! `SnapshotCell<T>` is a ready-made participant for values that can be
//! cloned cheaply enough to snapshot. The first time the cell is touched in
//! a level it stores a copy of its value in that level's state; if the
//! level rolls back, the copy is written back.
//!
//! # Nested Commits
//!
//! Committing a nested level is not final: the enclosing level may still
//! roll back. So on a nested commit the cell hands its snapshot to the
//! enclosing level, unless that level already holds an older snapshot of
//! its own, in which case the newer one is dropped. Only a commit of the
//! outermost level is final, and only then does the final-commit hook run.
//!
//! ```text
//! value = 1
//! open T0
//!   update -> snapshot(T0) = 1, value = 2
//!   open T1
//!     update -> snapshot(T1) = 2, value = 3
//!   commit T1 -> T0 already has a snapshot, drop snapshot(T1)
//! rollback T0 -> value = 1
//! ```

use crate::context::TransactionContext;
use crate::participant::{completion, CompletionFn, TransactionParticipant};
use crate::transaction::TransactionRef;
use enlist_core::{ParticipantId, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type FinalCommitHook<T> = Box<dyn Fn(&T) + Send + Sync>;

struct SnapshotInner<T> {
    id: ParticipantId,
    value: Mutex<T>,
    on_final_commit: Option<FinalCommitHook<T>>,
}

/// A transactional value that rolls back by restoring a snapshot
///
/// Clones share the same value and participant identity.
///
/// # Example
///
/// ```
/// use enlist_concurrency::{SnapshotCell, TransactionManager};
///
/// let manager = TransactionManager::new();
/// let cell = SnapshotCell::new(vec![1, 2]);
///
/// let mut txn = manager.open();
/// cell.update(&txn, |v| v.push(3)).unwrap();
/// txn.rollback().unwrap();
/// assert_eq!(cell.get(), vec![1, 2]);
///
/// let mut txn = manager.open();
/// cell.update(&txn, |v| v.push(4)).unwrap();
/// txn.commit().unwrap();
/// assert_eq!(cell.get(), vec![1, 2, 4]);
/// ```
pub struct SnapshotCell<T> {
    inner: Arc<SnapshotInner<T>>,
}

impl<T: Clone + Send + 'static> SnapshotCell<T> {
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        Self::build(value, None)
    }

    /// Create a cell that calls `hook` with the final value whenever an
    /// outermost transaction that touched the cell commits
    pub fn with_final_commit<F>(value: T, hook: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self::build(value, Some(Box::new(hook)))
    }

    fn build(value: T, on_final_commit: Option<FinalCommitHook<T>>) -> Self {
        SnapshotCell {
            inner: Arc::new(SnapshotInner {
                id: ParticipantId::next(),
                value: Mutex::new(value),
                on_final_commit,
            }),
        }
    }

    /// Clone of the current value
    ///
    /// Reflects uncommitted changes made by an open transaction.
    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    /// Enlist in `txn` (snapshotting on first touch) and mutate the value
    ///
    /// # Errors
    /// Fails without calling `f` if `txn` cannot be enlisted in.
    pub fn update<R>(&self, txn: &TransactionRef, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        txn.enlist(self)?;
        let mut value = self.inner.value.lock();
        Ok(f(&mut value))
    }
}

impl<T: Clone + Send + 'static> SnapshotInner<T> {
    fn completion(this: Arc<Self>) -> CompletionFn {
        completion(move |ctx| this.on_close(ctx))
    }

    fn on_close(self: Arc<Self>, ctx: &TransactionContext<'_>) {
        let Some(snapshot) = ctx.take_state::<T>() else {
            return;
        };

        if !ctx.is_committed() {
            *self.value.lock() = snapshot;
            return;
        }

        if ctx.depth() == 0 {
            if let Some(hook) = &self.on_final_commit {
                let value = self.value.lock().clone();
                hook(&value);
            }
            return;
        }

        let id = self.id;
        let this = Arc::clone(&self);
        let handed_up = ctx.enlist_in_parent(id, move |parent| {
            parent.set_state(snapshot);
            Self::completion(this)
        });
        if let Err(e) = handed_up {
            tracing::error!(participant = %id, error = %e, "could not hand snapshot to enclosing transaction");
        }
    }
}

impl<T: Clone + Send + 'static> TransactionParticipant for SnapshotCell<T> {
    fn participant_id(&self) -> ParticipantId {
        self.inner.id
    }

    fn on_enlist(&self, ctx: &TransactionContext<'_>) -> CompletionFn {
        ctx.set_state(self.get());
        SnapshotInner::completion(Arc::clone(&self.inner))
    }
}

impl<T> Clone for SnapshotCell<T> {
    fn clone(&self) -> Self {
        SnapshotCell {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}
