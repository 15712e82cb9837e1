//! Reentrant thread locks backing the transaction lock pair
//!
//! `open()` returns while still holding its locks and only `close()` gives
//! them back, so neither lock can be tied to a borrow-scoped guard. Both
//! are acquired and released explicitly and track the holding thread.
//!
//! - [`InnerLock`] wraps parking_lot's raw reentrant mutex.
//! - [`ReentrantLock`] is the outer lock. It carries its own ticket queue
//!   because parking_lot's mutexes are eventually fair only, and the outer
//!   lock may be configured to admit waiters strictly in arrival order.
//!   Re-acquisition by the holding thread never takes a ticket.

use parking_lot::lock_api::RawReentrantMutex;
use parking_lot::{Condvar, Mutex, RawMutex, RawThreadId};
use std::fmt;
use std::thread::{self, ThreadId};

/// Reentrant lock held by the thread that has levels open
pub(crate) struct InnerLock {
    raw: RawReentrantMutex<RawMutex, RawThreadId>,
}

impl InnerLock {
    /// Create an unlocked lock
    pub(crate) fn new() -> Self {
        InnerLock {
            raw: RawReentrantMutex::INIT,
        }
    }

    /// Acquire one hold for the calling thread, blocking while another
    /// thread holds the lock
    ///
    /// Returns `true` if the call had to wait.
    pub(crate) fn acquire(&self) -> bool {
        if self.raw.try_lock() {
            return false;
        }
        self.raw.lock();
        true
    }

    /// Release one hold of the calling thread
    ///
    /// # Panics
    /// Panics if the calling thread does not hold the lock.
    pub(crate) fn release(&self) {
        assert!(
            self.raw.is_owned_by_current_thread(),
            "lock released by a thread that does not hold it"
        );
        // SAFETY: the calling thread owns the lock, checked above
        unsafe { self.raw.unlock() }
    }

    /// Whether the calling thread currently holds the lock
    pub(crate) fn is_held_by_current_thread(&self) -> bool {
        self.raw.is_owned_by_current_thread()
    }

    /// Whether any thread currently holds the lock
    pub(crate) fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

impl fmt::Debug for InnerLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InnerLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[derive(Debug, Default)]
struct LockState {
    /// Thread currently holding the lock
    holder: Option<ThreadId>,
    /// Reentrant hold count of `holder`
    holds: usize,
    /// Next ticket handed to a waiter (fair mode)
    next_ticket: u64,
    /// Ticket allowed to take the lock next (fair mode)
    now_serving: u64,
}

/// Reentrant lock with explicit acquire/release and optional FIFO admission
#[derive(Debug)]
pub(crate) struct ReentrantLock {
    state: Mutex<LockState>,
    released: Condvar,
    fair: bool,
}

impl ReentrantLock {
    /// Create an unlocked lock
    pub(crate) fn new(fair: bool) -> Self {
        ReentrantLock {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
            fair,
        }
    }

    /// Acquire the lock for the calling thread, blocking while another
    /// thread holds it
    ///
    /// Returns `true` if the call had to wait.
    pub(crate) fn acquire(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.holder == Some(me) {
            state.holds += 1;
            return false;
        }

        let mut waited = false;
        if self.fair {
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            while state.holder.is_some() || state.now_serving != ticket {
                waited = true;
                self.released.wait(&mut state);
            }
            state.now_serving += 1;
        } else {
            while state.holder.is_some() {
                waited = true;
                self.released.wait(&mut state);
            }
        }

        state.holder = Some(me);
        state.holds = 1;
        waited
    }

    /// Release one hold of the calling thread
    ///
    /// # Panics
    /// Panics if the calling thread does not hold the lock.
    pub(crate) fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        assert_eq!(
            state.holder,
            Some(me),
            "lock released by a thread that does not hold it"
        );

        state.holds -= 1;
        if state.holds == 0 {
            state.holder = None;
            drop(state);
            // Fair waiters each check their own ticket, so all must wake
            if self.fair {
                self.released.notify_all();
            } else {
                self.released.notify_one();
            }
        }
    }

    /// Whether the calling thread currently holds the lock
    pub(crate) fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().holder == Some(thread::current().id())
    }

    /// Whether any thread currently holds the lock
    pub(crate) fn is_locked(&self) -> bool {
        self.state.lock().holder.is_some()
    }

    /// Hold count of the calling thread (0 if it does not hold the lock)
    #[cfg(test)]
    pub(crate) fn hold_count(&self) -> usize {
        let state = self.state.lock();
        if state.holder == Some(thread::current().id()) {
            state.holds
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc, Barrier};
    use std::time::Duration;

    // ========================================================================
    // Inner lock
    // ========================================================================

    #[test]
    fn test_inner_lock_is_reentrant() {
        let lock = InnerLock::new();
        assert!(!lock.is_locked());

        assert!(!lock.acquire());
        assert!(!lock.acquire());
        assert!(lock.is_held_by_current_thread());

        lock.release();
        assert!(lock.is_locked());
        assert!(lock.is_held_by_current_thread());

        lock.release();
        assert!(!lock.is_locked());
        assert!(!lock.is_held_by_current_thread());
    }

    #[test]
    #[should_panic(expected = "does not hold it")]
    fn test_inner_lock_release_without_holding_panics() {
        let lock = InnerLock::new();
        lock.release();
    }

    #[test]
    fn test_inner_lock_blocks_other_thread() {
        let lock = Arc::new(InnerLock::new());
        lock.acquire();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                assert!(!lock.is_held_by_current_thread());
                let waited = lock.acquire();
                acquired.store(true, Ordering::SeqCst);
                lock.release();
                waited
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst), "second thread must wait");

        lock.release();
        assert!(handle.join().unwrap());
        assert!(!lock.is_locked());
    }

    // ========================================================================
    // Outer lock
    // ========================================================================

    #[test]
    fn test_acquire_release_single_thread() {
        let lock = ReentrantLock::new(false);
        assert!(!lock.is_locked());

        assert!(!lock.acquire());
        assert!(lock.is_locked());
        assert!(lock.is_held_by_current_thread());
        assert_eq!(lock.hold_count(), 1);

        lock.release();
        assert!(!lock.is_locked());
        assert_eq!(lock.hold_count(), 0);
    }

    #[test]
    fn test_reentrant_acquire_counts_holds() {
        let lock = ReentrantLock::new(true);
        lock.acquire();
        lock.acquire();
        lock.acquire();
        assert_eq!(lock.hold_count(), 3);

        lock.release();
        lock.release();
        assert!(lock.is_locked());
        assert_eq!(lock.hold_count(), 1);

        lock.release();
        assert!(!lock.is_locked());
    }

    #[test]
    #[should_panic(expected = "does not hold it")]
    fn test_release_without_holding_panics() {
        let lock = ReentrantLock::new(false);
        lock.release();
    }

    #[test]
    fn test_other_thread_blocks_until_release() {
        let lock = Arc::new(ReentrantLock::new(false));
        lock.acquire();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let waited = lock.acquire();
                acquired.store(true, Ordering::SeqCst);
                assert_eq!(lock.hold_count(), 1);
                lock.release();
                waited
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst), "second thread must wait");

        lock.release();
        let waited = handle.join().unwrap();
        assert!(waited);
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_not_held_by_other_thread() {
        let lock = Arc::new(ReentrantLock::new(false));
        lock.acquire();

        let lock2 = Arc::clone(&lock);
        let held_elsewhere = std::thread::spawn(move || lock2.is_held_by_current_thread())
            .join()
            .unwrap();
        assert!(!held_elsewhere);

        lock.release();
    }

    #[test]
    fn test_fair_lock_admits_waiters_in_arrival_order() {
        let lock = Arc::new(ReentrantLock::new(true));
        lock.acquire();

        let (order_tx, order_rx) = mpsc::channel();
        let mut handles = Vec::new();

        // Start waiters one at a time so their ticket order is known
        for i in 0..4 {
            let lock = Arc::clone(&lock);
            let order_tx = order_tx.clone();
            let started = Arc::new(Barrier::new(2));
            let started2 = Arc::clone(&started);
            handles.push(std::thread::spawn(move || {
                started2.wait();
                lock.acquire();
                order_tx.send(i).unwrap();
                lock.release();
            }));
            started.wait();
            // Give the waiter time to take its ticket
            std::thread::sleep(Duration::from_millis(20));
        }

        lock.release();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(order_tx);

        let order: Vec<i32> = order_rx.iter().collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
