//! Repository interfaces the engine persists through.
//!
//! Each repository owns one entity type. Implementations must be atomic per
//! run id; the engine does no locking of its own.

use anyhow::Result;

use crate::core::state::{RunState, StepState};
use crate::model::{
    NewArtifact, NewRun, PrBinding, RunRecord, StepMetadataUpdate, StepRecord, ValidationReport,
};

pub trait RunRepo: Send + Sync {
    /// Persist a new run and return its id.
    fn create_run(&self, run: NewRun) -> Result<String>;

    fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>>;

    fn update_run_state(&self, run_id: &str, state: RunState) -> Result<()>;
}

pub trait StepRepo: Send + Sync {
    fn create_steps(&self, run_id: &str, steps: Vec<StepRecord>) -> Result<()>;

    /// Steps of `run_id` in stored order.
    fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>>;

    fn update_step_state(&self, run_id: &str, step_id: &str, state: StepState) -> Result<()>;

    fn update_step_metadata(
        &self,
        run_id: &str,
        step_id: &str,
        update: StepMetadataUpdate,
    ) -> Result<()>;
}

/// Append-only artifact storage.
pub trait ArtifactRepo: Send + Sync {
    /// Store `artifact` and return its id.
    fn add_artifact(&self, artifact: NewArtifact) -> Result<String>;
}

/// Append-only validation report storage.
pub trait ValidationReportRepo: Send + Sync {
    fn add_report(&self, run_id: &str, report: &ValidationReport) -> Result<String>;
}

pub trait PrBindingRepo: Send + Sync {
    fn get_binding(&self, run_id: &str) -> Result<Option<PrBinding>>;

    /// Insert or replace the binding for `binding.run_id`.
    fn upsert_binding(&self, binding: PrBinding) -> Result<()>;
}
