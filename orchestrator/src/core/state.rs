//! Lifecycle states for steps and runs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// Lifecycle state of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Queued,
    Planned,
    Executing,
    Validating,
    Committing,
    PrUpdated,
    Merged,
    Paused,
    Failed,
}

impl StepState {
    pub const ALL: [StepState; 9] = [
        StepState::Queued,
        StepState::Planned,
        StepState::Executing,
        StepState::Validating,
        StepState::Committing,
        StepState::PrUpdated,
        StepState::Merged,
        StepState::Paused,
        StepState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Queued => "queued",
            StepState::Planned => "planned",
            StepState::Executing => "executing",
            StepState::Validating => "validating",
            StepState::Committing => "committing",
            StepState::PrUpdated => "pr_updated",
            StepState::Merged => "merged",
            StepState::Paused => "paused",
            StepState::Failed => "failed",
        }
    }

    /// True when step selection skips this state.
    ///
    /// `pr_updated` is included: a step awaiting manual merge does not block
    /// the steps after it.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            StepState::Merged | StepState::PrUpdated | StepState::Failed
        )
    }

    /// True when this state counts toward run completion.
    pub fn counts_as_complete(self) -> bool {
        matches!(self, StepState::Merged | StepState::PrUpdated)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepState {
    type Err = OrchestratorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        StepState::ALL
            .into_iter()
            .find(|state| state.as_str() == raw)
            .ok_or_else(|| OrchestratorError::InvalidStepState {
                state: raw.to_string(),
            })
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    Paused,
    Failed,
    Completed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Failed => "failed",
            RunState::Completed => "completed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
