//! Lifecycle events emitted for step and run transitions.
//!
//! The serialized form is the canonical event payload:
//! `{run_id, step_id, state, timestamp, event_type, duration_ms?, meta?}`.
//! `step_id` is always present (null for run events); `duration_ms` and
//! `meta` are omitted when absent.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::lifecycle::PhaseTransition;
use crate::core::state::{RunState, StepState};
use crate::model::Fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEventType {
    #[serde(rename = "step.planned")]
    StepPlanned,
    #[serde(rename = "step.executing")]
    StepExecuting,
    #[serde(rename = "step.validated")]
    StepValidated,
    #[serde(rename = "step.committed")]
    StepCommitted,
    #[serde(rename = "step.paused")]
    StepPaused,
    #[serde(rename = "step.failed")]
    StepFailed,
    #[serde(rename = "run.status_changed")]
    RunStatusChanged,
}

impl LifecycleEventType {
    /// Event variant reported when a step lands in `state`.
    ///
    /// The commit, pull-request and merge transitions share `step.committed`;
    /// `queued` has no step event of its own.
    pub fn for_step_state(state: StepState) -> Option<Self> {
        match state {
            StepState::Planned => Some(Self::StepPlanned),
            StepState::Executing => Some(Self::StepExecuting),
            StepState::Validating => Some(Self::StepValidated),
            StepState::Committing | StepState::PrUpdated | StepState::Merged => {
                Some(Self::StepCommitted)
            }
            StepState::Paused => Some(Self::StepPaused),
            StepState::Failed => Some(Self::StepFailed),
            StepState::Queued => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepPlanned => "step.planned",
            Self::StepExecuting => "step.executing",
            Self::StepValidated => "step.validated",
            Self::StepCommitted => "step.committed",
            Self::StepPaused => "step.paused",
            Self::StepFailed => "step.failed",
            Self::RunStatusChanged => "run.status_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub run_id: String,
    pub step_id: Option<String>,
    pub state: String,
    #[serde(serialize_with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub event_type: LifecycleEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Fields>,
}

impl LifecycleEvent {
    /// Event for a step that completed `transition`.
    ///
    /// Returns `None` for states without a step event (`queued`).
    pub fn for_step(
        run_id: &str,
        step_id: &str,
        transition: &PhaseTransition,
        meta: Option<Fields>,
    ) -> Option<Self> {
        let event_type = LifecycleEventType::for_step_state(transition.state)?;
        Some(Self {
            run_id: run_id.to_string(),
            step_id: Some(step_id.to_string()),
            state: transition.state.as_str().to_string(),
            timestamp: transition.completed_at,
            event_type,
            duration_ms: Some(transition.duration_ms()),
            meta,
        })
    }

    pub fn run_status(run_id: &str, status: RunState, meta: Option<Fields>) -> Self {
        Self::run_status_at(run_id, status, Utc::now(), meta)
    }

    pub fn run_status_at(
        run_id: &str,
        status: RunState,
        at: DateTime<Utc>,
        meta: Option<Fields>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            step_id: None,
            state: status.as_str().to_string(),
            timestamp: at,
            event_type: LifecycleEventType::RunStatusChanged,
            duration_ms: None,
            meta,
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.as_ref()?.get(key)?.as_str()
    }
}

fn iso_millis<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
}
