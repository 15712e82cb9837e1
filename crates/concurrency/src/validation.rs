//! Validation of mutating transaction calls
//!
//! Every `enlist`, `commit`, `rollback` and `close` goes through one of
//! these checks before touching a level. The checks run in a fixed order:
//!
//! 1. the level is still open (`UseAfterClose`)
//! 2. the level is the innermost one (`NonInnermostAccess`)
//! 3. the calling thread holds the inner lock (`ForeignThreadAccess`)
//!
//! Callers hold the stack mutex while validating and keep holding it for
//! the mutation that follows, so the verdict cannot go stale in between.

use crate::level::{LevelStack, Phase};
use crate::lock::InnerLock;
use enlist_core::{Depth, Result, TransactionError};

/// Validate access to the open level `(depth, generation)`
pub(crate) fn validate_level(
    stack: &LevelStack,
    depth: Depth,
    generation: u64,
    inner: &InnerLock,
) -> Result<()> {
    match stack.live_level(depth, generation) {
        Some(level) if level.phase == Phase::Open => {}
        _ => return Err(TransactionError::UseAfterClose { depth }),
    }

    if stack.depth() != Some(depth) {
        return Err(TransactionError::NonInnermostAccess {
            depth,
            innermost: stack.depth(),
        });
    }

    if !inner.is_held_by_current_thread() {
        return Err(TransactionError::ForeignThreadAccess { depth });
    }

    Ok(())
}

/// Validate enlisting into the parent of the closing level `closing`
///
/// This is the one case where a non-innermost level may be mutated: while
/// the innermost level runs its completion callbacks, those callbacks may
/// hand work to the level directly enclosing it.
pub(crate) fn validate_parent(
    stack: &LevelStack,
    closing: Depth,
    inner: &InnerLock,
) -> Result<Depth> {
    let parent = match closing.checked_sub(1) {
        Some(parent) => parent,
        None => return Err(TransactionError::UseAfterClose { depth: closing }),
    };

    match stack.level(parent) {
        Some(level) if level.phase == Phase::Open => {}
        _ => return Err(TransactionError::UseAfterClose { depth: parent }),
    }

    let closing_is_top = stack.depth() == Some(closing)
        && matches!(stack.level(closing), Some(level) if level.phase == Phase::Closing);
    if !closing_is_top {
        return Err(TransactionError::NonInnermostAccess {
            depth: parent,
            innermost: stack.depth(),
        });
    }

    if !inner.is_held_by_current_thread() {
        return Err(TransactionError::ForeignThreadAccess { depth: parent });
    }

    Ok(parent)
}
