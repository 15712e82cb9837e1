//! Transaction manager: the level stack and its lock pair
//!
//! The manager owns every piece of shared mutable state in the crate:
//!
//! - the stack of level slots and the stack pointer
//! - the **outer lock**, taken by non-owner threads only
//! - the **inner lock**, taken by every thread for the lifetime of a level
//! - the optional owner thread
//!
//! ## Open Sequence
//!
//! ```text
//! 1. IF caller is not the owner thread: acquire outer lock (FIFO, reentrant)
//! 2. Acquire inner lock (reentrant, held until the level closes)
//! 3. Push a level: reuse the slot at the new depth or allocate one
//! 4. Return the level as a `Transaction` guard
//! ```
//!
//! The owner thread never queues behind non-owner threads on the outer
//! lock, but still waits on the inner lock while another thread has a
//! level open.
//!
//! A level that is never closed blocks every other thread forever. The
//! `Transaction` guard closes (rolls back) on drop, which is the only
//! protection against this.

use crate::config::ManagerConfig;
use crate::context::TransactionContext;
use crate::level::{LevelStack, Phase};
use crate::lock::{InnerLock, ReentrantLock};
use crate::participant::CompletionFn;
use crate::transaction::{Transaction, TransactionRef};
use enlist_core::{Depth, ParticipantId, Result, TransactionError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Point-in-time copy of the manager's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Levels opened
    pub opened: u64,
    /// Levels closed by commit
    pub committed: u64,
    /// Levels closed by rollback (explicit, `close()` or drop)
    pub rolled_back: u64,
    /// Successful (non-duplicate) enlistments
    pub enlisted: u64,
    /// Deepest depth reached (1-based; 0 if nothing was ever opened)
    pub max_depth: u64,
    /// Opens that skipped the outer lock because the caller was the owner
    pub owner_fast_path: u64,
    /// Opens that had to wait for a lock
    pub contended: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    opened: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    enlisted: AtomicU64,
    max_depth: AtomicU64,
    owner_fast_path: AtomicU64,
    contended: AtomicU64,
}

impl StatsCounters {
    fn record_open(&self, depth: Depth, owner: bool, contended: bool) {
        self.opened.fetch_add(1, Ordering::Relaxed);
        self.max_depth.fetch_max(depth as u64 + 1, Ordering::Relaxed);
        if owner {
            self.owner_fast_path.fetch_add(1, Ordering::Relaxed);
        }
        if contended {
            self.contended.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_close(&self, committed: bool) {
        if committed {
            self.committed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rolled_back.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> ManagerStats {
        ManagerStats {
            opened: self.opened.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            enlisted: self.enlisted.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
            owner_fast_path: self.owner_fast_path.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }
}

/// State shared by a manager and every handle it gives out
pub(crate) struct Shared {
    pub(crate) config: ManagerConfig,
    /// Queue for non-owner threads
    pub(crate) outer: ReentrantLock,
    /// Held by whichever thread has levels open
    pub(crate) inner: InnerLock,
    /// Only locked briefly, by the inner-lock holder (or for introspection)
    pub(crate) stack: Mutex<LevelStack>,
    owner: RwLock<Option<ThreadId>>,
    pub(crate) stats: StatsCounters,
}

impl Shared {
    /// Enlist `id` in the level chosen by `check`
    ///
    /// `check` validates access and names the target depth. It runs once
    /// before the factory and again before the insert, because the factory
    /// runs without the stack mutex and may itself open and close levels.
    pub(crate) fn enlist_with<F, C>(&self, id: ParticipantId, factory: F, check: C) -> Result<bool>
    where
        F: FnOnce(&TransactionContext<'_>) -> CompletionFn,
        C: Fn(&LevelStack, &InnerLock) -> Result<Depth>,
    {
        let target = {
            let stack = self.stack.lock();
            let target = check(&stack, &self.inner)?;
            if matches!(stack.level(target), Some(level) if level.is_enlisted(id)) {
                return Ok(false);
            }
            target
        };

        let ctx = TransactionContext::new(self, target, id, false);
        let on_close = factory(&ctx);

        let mut stack = self.stack.lock();
        let target = check(&stack, &self.inner)?;
        let added = match stack.level_mut(target) {
            Some(level) => level.enlist(id, on_close),
            None => return Err(TransactionError::UseAfterClose { depth: target }),
        };
        drop(stack);

        if added {
            self.stats.enlisted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(depth = target, participant = %id, "participant enlisted");
        }
        Ok(added)
    }

    fn is_owner_thread(&self) -> bool {
        *self.owner.read() == Some(thread::current().id())
    }
}

/// Coordinates nested transactions across threads
///
/// Cloning a `TransactionManager` yields another handle to the same stack
/// and locks; independent managers share nothing.
///
/// # Thread Safety
///
/// Any number of threads may call [`open`](Self::open) concurrently. One
/// thread at a time has levels open; others block in `open()` until that
/// thread closes its outermost level. A thread may nest `open()` calls
/// freely.
#[derive(Clone)]
pub struct TransactionManager {
    shared: Arc<Shared>,
}

impl TransactionManager {
    /// Create a manager with the default configuration
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Create a manager with an explicit configuration
    ///
    /// The config is not re-validated here; use
    /// [`ManagerConfig::validate`] or one of its loaders first.
    pub fn with_config(config: ManagerConfig) -> Self {
        let shared = Shared {
            outer: ReentrantLock::new(config.fair_outer_lock),
            inner: InnerLock::new(),
            stack: Mutex::new(LevelStack::with_slots(config.initial_depth)),
            owner: RwLock::new(None),
            stats: StatsCounters::default(),
            config,
        };
        TransactionManager {
            shared: Arc::new(shared),
        }
    }

    /// Configuration this manager was built with
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Open a transaction, nested inside any the calling thread already has open
    ///
    /// Blocks while another thread has a transaction open. Never fails.
    /// The returned guard must be committed or rolled back; dropping it
    /// rolls back.
    pub fn open(&self) -> Transaction {
        let shared = &self.shared;
        let owner = shared.is_owner_thread();

        let mut contended = false;
        if !owner {
            contended |= shared.outer.acquire();
        }
        contended |= shared.inner.acquire();

        let (depth, generation) = shared.stack.lock().push();
        shared.stats.record_open(depth, owner, contended);
        tracing::trace!(
            depth,
            owner,
            contended,
            thread = ?thread::current().id(),
            "transaction opened"
        );

        Transaction::new(
            TransactionRef::new(Arc::clone(shared), depth, generation),
            !owner,
        )
    }

    /// Innermost open transaction of the calling thread, without opening one
    ///
    /// Returns `None` if the calling thread has nothing open, or if its
    /// innermost level is in the middle of closing.
    pub fn current(&self) -> Option<TransactionRef> {
        let stack = self.shared.stack.lock();
        let depth = stack.depth()?;
        let level = stack.level(depth)?;
        if level.phase != Phase::Open || !self.shared.inner.is_held_by_current_thread() {
            return None;
        }
        Some(TransactionRef::new(
            Arc::clone(&self.shared),
            depth,
            level.generation,
        ))
    }

    /// Run `f` in a new transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back if it returns `Err`. If `f`
    /// already closed the transaction itself, nothing more is done.
    ///
    /// # Example
    ///
    /// ```
    /// use enlist_concurrency::{SnapshotCell, TransactionManager};
    /// use enlist_core::TransactionError;
    ///
    /// let manager = TransactionManager::new();
    /// let cell = SnapshotCell::new(10);
    ///
    /// let result: Result<(), TransactionError> = manager.transaction(|txn| {
    ///     cell.update(txn, |v| *v += 1)?;
    ///     Ok(())
    /// });
    /// assert!(result.is_ok());
    /// assert_eq!(cell.get(), 11);
    /// ```
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Transaction) -> std::result::Result<T, E>,
        E: From<TransactionError>,
    {
        let mut txn = self.open();
        match f(&mut txn) {
            Ok(value) => {
                if txn.is_open() {
                    txn.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                if txn.is_open() {
                    txn.rollback()?;
                }
                Err(e)
            }
        }
    }

    /// Depth of the innermost open level, on whichever thread holds it
    pub fn depth(&self) -> Option<Depth> {
        self.shared.stack.lock().depth()
    }

    /// Whether the calling thread has a transaction open
    pub fn is_active(&self) -> bool {
        self.shared.inner.is_held_by_current_thread()
    }

    /// Whether any thread has a transaction open
    pub fn is_locked(&self) -> bool {
        self.shared.inner.is_locked()
    }

    /// Install or clear the owner thread
    ///
    /// Intended to be called by the host when its privileged execution
    /// context starts (`Some`) and stops (`None`).
    pub fn set_owner_thread(&self, owner: Option<ThreadId>) {
        *self.shared.owner.write() = owner;
        tracing::debug!(?owner, "owner thread changed");
    }

    /// Make the calling thread the owner thread
    pub fn claim_owner_thread(&self) {
        self.set_owner_thread(Some(thread::current().id()));
    }

    /// Remove the owner thread; all threads then contend equally
    pub fn clear_owner_thread(&self) {
        self.set_owner_thread(None);
    }

    /// Current owner thread, if any
    pub fn owner_thread(&self) -> Option<ThreadId> {
        *self.shared.owner.read()
    }

    /// Whether the calling thread is the owner thread
    pub fn is_owner_thread(&self) -> bool {
        self.shared.is_owner_thread()
    }

    /// Snapshot of the manager's counters
    pub fn stats(&self) -> ManagerStats {
        self.shared.stats.snapshot()
    }

    /// Number of level slots allocated so far
    pub fn slot_count(&self) -> usize {
        self.shared.stack.lock().slots()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("depth", &self.depth())
            .field("owner", &self.owner_thread())
            .field("config", &self.shared.config)
            .finish()
    }
}
