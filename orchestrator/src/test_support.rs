//! Test-only collaborators, stores and git fixtures.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::agents::{
    BasicSubPlanner, CannedCoder, Coder, DiffValidator, PassthroughPlanner, Planner, Validator,
};
use crate::core::merge_policy::MergeRule;
use crate::core::work_order::WorkOrder;
use crate::engine::{Agents, Orchestrator, Stores};
use crate::io::config::OrchestratorConfig;
use crate::io::events::MemoryEventSink;
use crate::io::memory::MemoryStore;
use crate::io::store::ArtifactRepo;
use crate::io::vcs::DryRunVcs;
use crate::model::{
    CoderResult, Finding, NewArtifact, PlannerOutput, StepInput, StepRecord, ValidationReport,
};

/// Temporary git repository on branch `main` with one commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let path = dir.path();
        git(path, &["init", "-q", "-b", "main"])?;
        git(path, &["config", "user.name", "Orchestrator Test"])?;
        git(path, &["config", "user.email", "orchestrator@example.test"])?;
        git(path, &["config", "commit.gpgsign", "false"])?;
        fs::write(path.join("README.md"), "# test repo\n").context("write README.md")?;
        git(path, &["add", "README.md"])?;
        git(path, &["commit", "-q", "-m", "initial commit"])?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn git(dir: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !status.success() {
        bail!("git {} failed with {status}", args.join(" "));
    }
    Ok(())
}

/// Report with a single fatal finding.
pub fn fatal_report() -> ValidationReport {
    ValidationReport {
        fatal: vec![Finding {
            code: "TEST_FAILURE".to_string(),
            file: "src/lib.rs".to_string(),
            line: Some(1),
            message: "tests failed".to_string(),
        }],
        ..ValidationReport::default()
    }
}

/// Validator that returns queued reports in order, then defers to
/// [`DiffValidator`] once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    queue: Mutex<VecDeque<ValidationReport>>,
    fallback: DiffValidator,
}

impl ScriptedValidator {
    pub fn new(reports: Vec<ValidationReport>) -> Self {
        Self {
            queue: Mutex::new(reports.into()),
            fallback: DiffValidator::default(),
        }
    }
}

impl Validator for ScriptedValidator {
    fn validate(&self, diff: &str, base_ref: &str, feature_ref: &str) -> Result<ValidationReport> {
        let next = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(report) => Ok(report),
            None => self.fallback.validate(diff, base_ref, feature_ref),
        }
    }
}

/// Collaborator that fails every call with `message`.
#[derive(Debug, Clone)]
pub struct Failing {
    message: String,
}

impl Failing {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Planner for Failing {
    fn plan_step(&self, _step: &StepRecord) -> Result<PlannerOutput> {
        Err(anyhow!(self.message.clone()))
    }
}

impl Coder for Failing {
    fn execute(&self, _work_order: &WorkOrder) -> Result<CoderResult> {
        Err(anyhow!(self.message.clone()))
    }
}

impl Validator for Failing {
    fn validate(&self, _diff: &str, _base: &str, _feature: &str) -> Result<ValidationReport> {
        Err(anyhow!(self.message.clone()))
    }
}

impl ArtifactRepo for Failing {
    fn add_artifact(&self, _artifact: NewArtifact) -> Result<String> {
        Err(anyhow!(self.message.clone()))
    }
}

/// An orchestrator wired to in-memory stores, a dry-run VCS and a recording
/// event sink.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<MemoryStore>,
    pub events: Arc<MemoryEventSink>,
    pub vcs: Arc<DryRunVcs>,
}

impl Harness {
    /// Default config and reference collaborators.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Start a run against `org/repo` on `main`.
    pub fn start(&self, steps: Vec<StepInput>) -> String {
        self.orchestrator
            .start_run("org/repo", "main", steps)
            .expect("start run")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    config: OrchestratorConfig,
    planner: Option<Arc<dyn Planner>>,
    coder: Option<Arc<dyn Coder>>,
    validator: Option<Arc<dyn Validator>>,
    artifacts: Option<Arc<dyn ArtifactRepo>>,
    merge_policy: Option<Arc<dyn MergeRule>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn auto_merge(mut self) -> Self {
        self.config.merge.auto = true;
        self
    }

    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn coder(mut self, coder: Arc<dyn Coder>) -> Self {
        self.coder = Some(coder);
        self
    }

    pub fn failing_coder(self, message: &str) -> Self {
        self.coder(Arc::new(Failing::new(message)))
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Hand out `reports` on successive validations.
    pub fn validator_reports(self, reports: Vec<ValidationReport>) -> Self {
        self.validator(Arc::new(ScriptedValidator::new(reports)))
    }

    /// Replace the artifact repository, e.g. with one that always fails.
    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactRepo>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn merge_policy(mut self, merge_policy: Arc<dyn MergeRule>) -> Self {
        self.merge_policy = Some(merge_policy);
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(MemoryEventSink::new());
        let vcs = Arc::new(DryRunVcs::new());

        let mut stores = Stores::shared(store.clone());
        if let Some(artifacts) = self.artifacts {
            stores.artifacts = artifacts;
        }
        let agents = Agents {
            planner: self
                .planner
                .unwrap_or_else(|| Arc::new(PassthroughPlanner)),
            sub_planner: Arc::new(BasicSubPlanner),
            coder: self
                .coder
                .unwrap_or_else(|| Arc::new(CannedCoder::work_order_file())),
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(DiffValidator::new(self.config.validator.clone()))),
            vcs: vcs.clone(),
        };
        let mut orchestrator = Orchestrator::new(stores, agents, events.clone(), self.config);
        if let Some(merge_policy) = self.merge_policy {
            orchestrator = orchestrator.with_merge_policy(merge_policy);
        }
        Harness {
            orchestrator,
            store,
            events,
            vcs,
        }
    }
}
