//! In-memory implementation of every repository.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use chrono::Utc;

use crate::core::state::{RunState, StepState};
use crate::io::store::{ArtifactRepo, PrBindingRepo, RunRepo, StepRepo, ValidationReportRepo};
use crate::model::{
    NewArtifact, NewRun, PrBinding, RunRecord, StepMetadataUpdate, StepRecord, ValidationReport,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub id: String,
    pub artifact: NewArtifact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: String,
    pub run_id: String,
    pub report: ValidationReport,
}

#[derive(Debug, Default)]
struct Inner {
    runs: BTreeMap<String, RunRecord>,
    steps: BTreeMap<String, Vec<StepRecord>>,
    artifacts: Vec<StoredArtifact>,
    reports: Vec<StoredReport>,
    bindings: BTreeMap<String, PrBinding>,
}

/// Thread-safe store backing all five repositories with one mutex.
///
/// Ids are sequential: `run-0001`, `artifact-0001`, `report-0001`, ...
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts written for `step_id`, oldest first.
    pub fn list_artifacts(&self, step_id: &str) -> Vec<StoredArtifact> {
        self.lock()
            .artifacts
            .iter()
            .filter(|stored| stored.artifact.step_id == step_id)
            .cloned()
            .collect()
    }

    /// Validation reports written for `run_id`, oldest first.
    pub fn list_reports(&self, run_id: &str) -> Vec<StoredReport> {
        self.lock()
            .reports
            .iter()
            .filter(|stored| stored.run_id == run_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sequential_id(prefix: &str, count: usize) -> String {
    format!("{prefix}-{:04}", count + 1)
}

fn find_step<'a>(
    inner: &'a mut Inner,
    run_id: &str,
    step_id: &str,
) -> Result<&'a mut StepRecord> {
    inner
        .steps
        .get_mut(run_id)
        .and_then(|steps| steps.iter_mut().find(|step| step.id == step_id))
        .ok_or_else(|| anyhow!("step `{step_id}` not found in run `{run_id}`"))
}

impl RunRepo for MemoryStore {
    fn create_run(&self, run: NewRun) -> Result<String> {
        let mut inner = self.lock();
        let id = sequential_id("run", inner.runs.len());
        let now = Utc::now();
        inner.runs.insert(
            id.clone(),
            RunRecord {
                id: id.clone(),
                repo: run.repo,
                base_ref: run.base_ref,
                feature_ref: run.feature_ref,
                status: run.status,
                config: run.config,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.lock().runs.get(run_id).cloned())
    }

    fn update_run_state(&self, run_id: &str, state: RunState) -> Result<()> {
        let mut inner = self.lock();
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| anyhow!("run `{run_id}` not found"))?;
        run.status = state;
        run.updated_at = Utc::now();
        Ok(())
    }
}

impl StepRepo for MemoryStore {
    fn create_steps(&self, run_id: &str, steps: Vec<StepRecord>) -> Result<()> {
        self.lock()
            .steps
            .entry(run_id.to_string())
            .or_default()
            .extend(steps);
        Ok(())
    }

    fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>> {
        Ok(self.lock().steps.get(run_id).cloned().unwrap_or_default())
    }

    fn update_step_state(&self, run_id: &str, step_id: &str, state: StepState) -> Result<()> {
        let mut inner = self.lock();
        let step = find_step(&mut inner, run_id, step_id)?;
        step.state = state;
        step.updated_at = Utc::now();
        Ok(())
    }

    fn update_step_metadata(
        &self,
        run_id: &str,
        step_id: &str,
        update: StepMetadataUpdate,
    ) -> Result<()> {
        let mut inner = self.lock();
        let step = find_step(&mut inner, run_id, step_id)?;
        if let Some(plan) = update.plan {
            step.plan = Some(plan);
        }
        if let Some(work_order) = update.work_order {
            step.work_order = Some(work_order);
        }
        if let Some(coder_result) = update.coder_result {
            step.coder_result = Some(coder_result);
        }
        step.updated_at = Utc::now();
        Ok(())
    }
}

impl ArtifactRepo for MemoryStore {
    fn add_artifact(&self, artifact: NewArtifact) -> Result<String> {
        let mut inner = self.lock();
        let id = sequential_id("artifact", inner.artifacts.len());
        inner.artifacts.push(StoredArtifact {
            id: id.clone(),
            artifact,
        });
        Ok(id)
    }
}

impl ValidationReportRepo for MemoryStore {
    fn add_report(&self, run_id: &str, report: &ValidationReport) -> Result<String> {
        let mut inner = self.lock();
        let id = sequential_id("report", inner.reports.len());
        inner.reports.push(StoredReport {
            id: id.clone(),
            run_id: run_id.to_string(),
            report: report.clone(),
        });
        Ok(id)
    }
}

impl PrBindingRepo for MemoryStore {
    fn get_binding(&self, run_id: &str) -> Result<Option<PrBinding>> {
        Ok(self.lock().bindings.get(run_id).cloned())
    }

    fn upsert_binding(&self, binding: PrBinding) -> Result<()> {
        self.lock()
            .bindings
            .insert(binding.run_id.clone(), binding);
        Ok(())
    }
}
