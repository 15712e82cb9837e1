//! Transaction level stack
//!
//! Each nesting depth owns one `Level` slot. Slots are created the first
//! time a depth is reached and recycled afterwards: closing a level clears
//! its collections without freeing them, so a warm stack opens and closes
//! without allocating.

use crate::participant::CompletionFn;
use enlist_core::{Depth, ParticipantId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;

/// Lifecycle of a level slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Not part of the open stack
    Idle,
    /// Open and accepting enlistments
    Open,
    /// Running completion callbacks
    Closing,
}

/// One enlisted participant and the callback it registered
pub(crate) struct Enlistment {
    pub(crate) id: ParticipantId,
    pub(crate) on_close: CompletionFn,
}

/// One nesting level
pub(crate) struct Level {
    pub(crate) phase: Phase,
    /// Distinguishes successive opens of the same slot
    pub(crate) generation: u64,
    enlisted: Vec<Enlistment>,
    members: FxHashSet<ParticipantId>,
    state: FxHashMap<ParticipantId, Box<dyn Any + Send>>,
}

impl Level {
    fn new() -> Self {
        Level {
            phase: Phase::Idle,
            generation: 0,
            enlisted: Vec::new(),
            members: FxHashSet::default(),
            state: FxHashMap::default(),
        }
    }

    fn begin(&mut self, generation: u64) {
        debug_assert_eq!(self.phase, Phase::Idle);
        debug_assert!(self.enlisted.is_empty() && self.state.is_empty());
        self.phase = Phase::Open;
        self.generation = generation;
    }

    /// Whether `id` has already enlisted at this level
    pub(crate) fn is_enlisted(&self, id: ParticipantId) -> bool {
        self.members.contains(&id)
    }

    /// Record an enlistment; first registration wins
    ///
    /// Returns `false` (and drops `on_close`) if `id` is already enlisted.
    pub(crate) fn enlist(&mut self, id: ParticipantId, on_close: CompletionFn) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.enlisted.push(Enlistment { id, on_close });
        true
    }

    /// Number of participants waiting for completion
    pub(crate) fn participant_count(&self) -> usize {
        self.enlisted.len()
    }

    /// Enter the closing phase and hand out the callbacks in enlistment order
    pub(crate) fn begin_close(&mut self) -> Vec<Enlistment> {
        self.phase = Phase::Closing;
        std::mem::take(&mut self.enlisted)
    }

    /// Clear the slot for reuse
    ///
    /// `drained` is the (now empty) vector returned by `begin_close`; it is
    /// put back so its capacity survives.
    pub(crate) fn reset(&mut self, mut drained: Vec<Enlistment>) {
        drained.clear();
        self.enlisted = drained;
        self.members.clear();
        self.state.clear();
        self.phase = Phase::Idle;
    }

    pub(crate) fn state(&self, id: ParticipantId) -> Option<&(dyn Any + Send)> {
        self.state.get(&id).map(|boxed| boxed.as_ref())
    }

    pub(crate) fn set_state(&mut self, id: ParticipantId, value: Box<dyn Any + Send>) {
        self.state.insert(id, value);
    }

    pub(crate) fn take_state(&mut self, id: ParticipantId) -> Option<Box<dyn Any + Send>> {
        self.state.remove(&id)
    }
}

/// The manager's stack of levels plus the stack pointer
pub(crate) struct LevelStack {
    levels: Vec<Level>,
    depth: Option<Depth>,
    next_generation: u64,
}

impl LevelStack {
    /// Create a stack with `slots` levels preallocated
    pub(crate) fn with_slots(slots: usize) -> Self {
        LevelStack {
            levels: (0..slots).map(|_| Level::new()).collect(),
            depth: None,
            next_generation: 1,
        }
    }

    /// Innermost open depth
    pub(crate) fn depth(&self) -> Option<Depth> {
        self.depth
    }

    /// Number of slots allocated so far
    pub(crate) fn slots(&self) -> usize {
        self.levels.len()
    }

    pub(crate) fn level(&self, depth: Depth) -> Option<&Level> {
        self.levels.get(depth)
    }

    pub(crate) fn level_mut(&mut self, depth: Depth) -> Option<&mut Level> {
        self.levels.get_mut(depth)
    }

    /// Level at `depth`, but only if it is still the open instance `generation`
    pub(crate) fn live_level(&self, depth: Depth, generation: u64) -> Option<&Level> {
        self.level(depth)
            .filter(|level| level.generation == generation && level.phase != Phase::Idle)
    }

    /// Push a new innermost level, reusing a slot when one exists
    ///
    /// Returns the new depth and the generation assigned to this open.
    pub(crate) fn push(&mut self) -> (Depth, u64) {
        let depth = self.depth.map_or(0, |d| d + 1);
        if depth == self.levels.len() {
            self.levels.push(Level::new());
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.levels[depth].begin(generation);
        self.depth = Some(depth);
        (depth, generation)
    }

    /// Pop the level at `depth`
    ///
    /// Returns `true` if this emptied the stack (root close).
    pub(crate) fn pop(&mut self, depth: Depth) -> bool {
        debug_assert_eq!(self.depth, Some(depth));
        self.depth = depth.checked_sub(1);
        self.depth.is_none()
    }
}
