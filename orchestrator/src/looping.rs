//! Drive loop that advances a run until it settles.

use crate::core::state::{RunState, StepState};
use crate::engine::{Orchestrator, StepAdvance};
use crate::error::OrchestratorError;

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every step is merged or awaiting manual merge.
    Completed,
    /// The run is paused. `step_id` is the step that paused it, when this
    /// loop saw it happen.
    Paused { step_id: Option<String> },
    /// A collaborator failed while driving `step_id`.
    StepFailed { step_id: String },
    /// The run was marked failed.
    RunFailed,
    /// No step can be advanced but the run is not complete.
    Stalled,
    /// The loop made `max_advances` advances without settling.
    MaxAdvancesExceeded { max_advances: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub run_id: String,
    pub advances: u32,
    pub stop: LoopStop,
}

/// Advance `run_id` repeatedly until the run completes, pauses or fails, a
/// step fails, nothing is left to advance, or `max_advances` is reached.
///
/// A paused run is never advanced. Control errors stop the loop immediately.
pub fn run_loop<F: FnMut(&StepAdvance)>(
    orchestrator: &Orchestrator,
    run_id: &str,
    max_advances: u32,
    mut on_advance: F,
) -> Result<LoopOutcome, OrchestratorError> {
    let mut advances = 0u32;
    let outcome = |advances, stop| LoopOutcome {
        run_id: run_id.to_string(),
        advances,
        stop,
    };

    loop {
        match orchestrator.run(run_id)?.status {
            RunState::Completed => return Ok(outcome(advances, LoopStop::Completed)),
            RunState::Paused => {
                return Ok(outcome(advances, LoopStop::Paused { step_id: None }));
            }
            RunState::Failed => return Ok(outcome(advances, LoopStop::RunFailed)),
            RunState::Queued | RunState::Running => {}
        }
        if advances >= max_advances {
            return Ok(outcome(
                advances,
                LoopStop::MaxAdvancesExceeded { max_advances },
            ));
        }

        let advance = match orchestrator.advance(run_id) {
            Ok(advance) => advance,
            Err(OrchestratorError::NoPendingSteps { .. }) => {
                let stop = if orchestrator.run(run_id)?.status == RunState::Completed {
                    LoopStop::Completed
                } else {
                    LoopStop::Stalled
                };
                return Ok(outcome(advances, stop));
            }
            Err(err) => return Err(err),
        };
        advances += 1;
        on_advance(&advance);

        match advance.state {
            StepState::Failed => {
                return Ok(outcome(
                    advances,
                    LoopStop::StepFailed {
                        step_id: advance.step_id,
                    },
                ));
            }
            StepState::Paused => {
                return Ok(outcome(
                    advances,
                    LoopStop::Paused {
                        step_id: Some(advance.step_id),
                    },
                ));
            }
            _ => {}
        }
    }
}
