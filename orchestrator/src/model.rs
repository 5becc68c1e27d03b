//! Records and payloads exchanged between the engine, its collaborators, and
//! the repositories.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::diff::{DiffError, check_diff};
use crate::core::state::{RunState, StepState};
use crate::core::work_order::WorkOrder;
use crate::io::config::OrchestratorConfig;

/// Open key/value map used for plan payloads and metadata.
pub type Fields = serde_json::Map<String, Value>;

/// Serialize any payload into a [`Fields`] map.
///
/// This is the single conversion every payload goes through before it is
/// stored as metadata; non-object payloads are rejected.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value).context("serialize payload")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("payload is not an object: {other}")),
    }
}

/// A run as stored by the run repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub repo: String,
    pub base_ref: String,
    pub feature_ref: String,
    pub status: RunState,
    pub config: OrchestratorConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a run.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub repo: String,
    pub base_ref: String,
    pub feature_ref: String,
    pub status: RunState,
    pub config: OrchestratorConfig,
}

/// Caller-supplied step description for `start_run`.
///
/// Everything except the identity fields is kept in `inputs` and handed to
/// the planner untouched (constraints, acceptance criteria, hints, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StepState>,
    #[serde(flatten)]
    pub inputs: Fields,
}

impl StepInput {
    pub fn titled(title: &str, body: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            body: Some(body.to_string()),
            ..Self::default()
        }
    }
}

/// A step as stored by the step repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: String,
    pub id: String,
    pub index: usize,
    pub title: String,
    pub body: String,
    pub state: StepState,
    #[serde(default)]
    pub inputs: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_order: Option<WorkOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coder_result: Option<CoderResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepRecord {
    /// Fill defaults for a caller-supplied step at `position` in the batch.
    pub fn from_input(run_id: &str, position: usize, input: StepInput, now: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.to_string(),
            id: input
                .id
                .unwrap_or_else(|| format!("{run_id}-step-{position}")),
            index: input.index.unwrap_or(position),
            title: input
                .title
                .unwrap_or_else(|| format!("Step {}", position + 1)),
            body: input.body.unwrap_or_default(),
            state: input.state.unwrap_or(StepState::Queued),
            inputs: input.inputs,
            plan: None,
            work_order: None,
            coder_result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metadata attached to a step as the pipeline progresses.
///
/// `None` fields are left untouched by the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepMetadataUpdate {
    pub plan: Option<Fields>,
    pub work_order: Option<WorkOrder>,
    pub coder_result: Option<CoderResult>,
}

/// Output of the planning collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// A plan that still has to go through the sub-planner.
    RawPlan(Fields),
    /// A work order the planner already finalized.
    FinalizedWorkOrder(WorkOrder),
}

/// Output of the coding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoderResult {
    pub work_order_id: String,
    pub diff: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CoderResult {
    pub fn new(
        work_order_id: impl Into<String>,
        diff: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Self, DiffError> {
        let result = Self {
            work_order_id: work_order_id.into(),
            diff: diff.into(),
            notes,
        };
        result.check()?;
        Ok(result)
    }

    /// The diff must be empty or a unified diff.
    pub fn check(&self) -> Result<(), DiffError> {
        check_diff(&self.diff)
    }

    /// Notes worth persisting (non-blank).
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref().filter(|notes| !notes.trim().is_empty())
    }
}

/// A validation finding that blocks automatic progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub code: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
}

/// A non-blocking validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: String,
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub lint_errors: u32,
    pub tests_run: u32,
    pub tests_failed: u32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Output of the validation collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub step_id: String,
    #[serde(default)]
    pub fatal: Vec<Finding>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub metrics: ValidationMetrics,
}

impl ValidationReport {
    /// Neutral report used when validation did not run on this pass.
    pub fn placeholder(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            ..Self::default()
        }
    }

    pub fn has_fatal(&self) -> bool {
        !self.fatal.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Diff,
    Doc,
    Log,
    Blob,
    Rejection,
}

/// An artifact to append to the artifact repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub run_id: String,
    pub step_id: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub meta: Fields,
}

/// Run to pull-request mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrBinding {
    pub run_id: String,
    pub pr_number: u64,
    pub pr_url: String,
    pub head: String,
    pub base: String,
}
