//! Step state machine and per-phase timing.
//!
//! [`StepLifecycle`] is the forward transition table consulted one hop at a
//! time by the engine. `paused` and `failed` never appear in it: the engine
//! applies those out of band. [`LifecycleTracker`] measures how long each
//! phase took during a single advance and is never persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::core::state::StepState;

/// Forward transition table for step states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLifecycle {
    transitions: BTreeMap<StepState, StepState>,
}

impl StepLifecycle {
    pub fn new(transitions: impl IntoIterator<Item = (StepState, StepState)>) -> Self {
        Self {
            transitions: transitions.into_iter().collect(),
        }
    }

    /// Successor of `state`, or `None` when the table has no entry for it.
    pub fn next(&self, state: StepState) -> Option<StepState> {
        self.transitions.get(&state).copied()
    }

    /// States visited from `start` until the table runs out, `start` included.
    pub fn sequence(&self, start: StepState) -> Vec<StepState> {
        let mut states = vec![start];
        let mut current = start;
        while let Some(next) = self.next(current) {
            // A cyclic custom table would never terminate.
            if states.contains(&next) {
                break;
            }
            states.push(next);
            current = next;
        }
        states
    }
}

impl Default for StepLifecycle {
    fn default() -> Self {
        Self::new([
            (StepState::Queued, StepState::Planned),
            (StepState::Planned, StepState::Executing),
            (StepState::Executing, StepState::Validating),
            (StepState::Validating, StepState::Committing),
            (StepState::Committing, StepState::PrUpdated),
            (StepState::PrUpdated, StepState::Merged),
        ])
    }
}

/// Timing record for one completed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub state: StepState,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PhaseTransition {
    /// A zero-length transition, used for out-of-band state changes.
    pub fn instant(state: StepState, at: DateTime<Utc>) -> Self {
        Self {
            state,
            started_at: at,
            completed_at: at,
        }
    }

    /// Phase duration in milliseconds, floored at zero.
    pub fn duration_ms(&self) -> u64 {
        let millis = (self.completed_at - self.started_at).num_milliseconds();
        u64::try_from(millis).unwrap_or(0)
    }
}

/// Phase start times for one step advance.
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    started: BTreeMap<StepState, DateTime<Utc>>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, state: StepState) {
        self.start_at(state, Utc::now());
    }

    /// Record the start of `state` unless it is already being tracked.
    pub fn start_at(&mut self, state: StepState, at: DateTime<Utc>) {
        self.started.entry(state).or_insert(at);
    }

    pub fn finish(&mut self, state: StepState) -> PhaseTransition {
        self.finish_at(state, Utc::now())
    }

    /// Close the phase for `state`.
    ///
    /// A phase that was never started is treated as starting at `at`. The
    /// completion time becomes the new start so a repeated phase measures
    /// from the previous finish.
    pub fn finish_at(&mut self, state: StepState, at: DateTime<Utc>) -> PhaseTransition {
        let started_at = *self.started.entry(state).or_insert(at);
        self.started.insert(state, at);
        PhaseTransition {
            state,
            started_at,
            completed_at: at,
        }
    }
}
