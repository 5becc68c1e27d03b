//! Deterministic step selection for a run.

use crate::model::StepRecord;

/// Find the first step in stored order that is not settled.
///
/// Returns `None` if every step is merged, awaiting manual merge, or failed.
pub fn first_pending_step(steps: &[StepRecord]) -> Option<&StepRecord> {
    steps.iter().find(|step| !step.state.is_settled())
}

/// Returns true if the run has steps and every one of them counts as done.
pub fn is_run_complete(steps: &[StepRecord]) -> bool {
    !steps.is_empty() && steps.iter().all(|step| step.state.counts_as_complete())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StepState;
    use crate::model::StepInput;
    use chrono::Utc;

    fn steps(states: &[StepState]) -> Vec<StepRecord> {
        let now = Utc::now();
        states
            .iter()
            .enumerate()
            .map(|(index, state)| {
                let mut step = StepRecord::from_input("run", index, StepInput::default(), now);
                step.state = *state;
                step
            })
            .collect()
    }

    #[test]
    fn selects_earliest_unsettled_step() {
        let all = steps(&[StepState::PrUpdated, StepState::Failed, StepState::Paused]);
        let found = first_pending_step(&all).expect("pending");
        assert_eq!(found.index, 2);
    }

    #[test]
    fn paused_and_mid_pipeline_steps_are_pending() {
        for state in [StepState::Queued, StepState::Committing, StepState::Paused] {
            assert!(first_pending_step(&steps(&[state])).is_some(), "{state}");
        }
    }

    #[test]
    fn nothing_pending_when_all_settled() {
        let all = steps(&[StepState::Merged, StepState::Failed]);
        assert!(first_pending_step(&all).is_none());
    }

    #[test]
    fn failed_steps_prevent_completion() {
        assert!(is_run_complete(&steps(&[StepState::Merged, StepState::PrUpdated])));
        assert!(!is_run_complete(&steps(&[StepState::Merged, StepState::Failed])));
        assert!(!is_run_complete(&[]));
    }
}
