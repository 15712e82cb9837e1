//! Participant interface
//!
//! A participant is any stateful component that wants to hear how the
//! current unit of work ends. It enlists once per level; in return the
//! level runs the completion callback it handed over when the level
//! commits or rolls back.

use crate::context::TransactionContext;
use enlist_core::ParticipantId;
use std::sync::Arc;

/// Callback run exactly once when the level it was enlisted in closes
///
/// The context tells the callback whether the level committed and gives
/// access to the state the participant stashed at that level.
pub type CompletionFn = Box<dyn FnOnce(&TransactionContext<'_>) + Send + 'static>;

/// Box a closure as a [`CompletionFn`]
///
/// Spelling the closure through this function pins down the
/// higher-ranked context lifetime, which plain `Box::new` often cannot
/// infer.
pub fn completion<F>(f: F) -> CompletionFn
where
    F: FnOnce(&TransactionContext<'_>) + Send + 'static,
{
    Box::new(f)
}

/// A component that can enlist in a transaction
///
/// # Example
///
/// ```
/// use enlist_concurrency::{completion, CompletionFn, TransactionContext, TransactionManager,
///     TransactionParticipant};
/// use enlist_core::ParticipantId;
/// use parking_lot::Mutex;
/// use std::sync::Arc;
///
/// struct Counter {
///     id: ParticipantId,
///     value: Arc<Mutex<i64>>,
/// }
///
/// impl TransactionParticipant for Counter {
///     fn participant_id(&self) -> ParticipantId {
///         self.id
///     }
///
///     fn on_enlist(&self, ctx: &TransactionContext<'_>) -> CompletionFn {
///         // Remember the value as it was when this level first saw us
///         ctx.set_state(*self.value.lock());
///         let value = Arc::clone(&self.value);
///         completion(move |ctx| {
///             if !ctx.is_committed() {
///                 if let Some(before) = ctx.take_state::<i64>() {
///                     *value.lock() = before;
///                 }
///             }
///         })
///     }
/// }
///
/// let manager = TransactionManager::new();
/// let counter = Counter { id: ParticipantId::next(), value: Arc::new(Mutex::new(1)) };
///
/// let mut txn = manager.open();
/// txn.enlist(&counter).unwrap();
/// *counter.value.lock() = 5;
/// txn.close().unwrap(); // never committed: rolls back
///
/// assert_eq!(*counter.value.lock(), 1);
/// ```
pub trait TransactionParticipant {
    /// Identity this participant enlists under
    ///
    /// Must return the same id for the lifetime of the participant.
    fn participant_id(&self) -> ParticipantId;

    /// Called on the first enlistment in a level
    ///
    /// `ctx` is scoped to this participant and the enlisting level; state
    /// stored through it is visible again to the returned callback.
    fn on_enlist(&self, ctx: &TransactionContext<'_>) -> CompletionFn;
}

impl<P: TransactionParticipant + ?Sized> TransactionParticipant for Arc<P> {
    fn participant_id(&self) -> ParticipantId {
        (**self).participant_id()
    }

    fn on_enlist(&self, ctx: &TransactionContext<'_>) -> CompletionFn {
        (**self).on_enlist(ctx)
    }
}
