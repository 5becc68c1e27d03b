//! Self-contained demo run with in-memory stores and a dry-run VCS.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::{BasicSubPlanner, CannedCoder, DiffValidator, PassthroughPlanner, Validator};
use crate::core::events::LifecycleEvent;
use crate::engine::{Agents, Orchestrator, Stores};
use crate::io::config::OrchestratorConfig;
use crate::io::events::{EventSchema, MemoryEventSink};
use crate::io::memory::MemoryStore;
use crate::io::vcs::DryRunVcs;
use crate::looping::{LoopOutcome, run_loop};
use crate::model::{Finding, StepInput, ValidationReport};

pub const DEMO_REPO: &str = "org/demo-repo";
pub const DEMO_BASE_REF: &str = "main";

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub config: OrchestratorConfig,
    /// Number of steps in the run.
    pub steps: usize,
    /// Zero-based step whose validation reports a fatal finding.
    pub fatal_step: Option<usize>,
    pub max_advances: u32,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            steps: 2,
            fatal_step: None,
            max_advances: 32,
        }
    }
}

#[derive(Debug)]
pub struct DemoReport {
    pub outcome: LoopOutcome,
    /// Every lifecycle event, in publish order. All passed schema validation.
    pub events: Vec<LifecycleEvent>,
}

/// Diff validator that adds a fatal finding on one validation call.
struct FatalOnCall {
    inner: DiffValidator,
    target: usize,
    calls: AtomicUsize,
}

impl Validator for FatalOnCall {
    fn validate(&self, diff: &str, base_ref: &str, feature_ref: &str) -> Result<ValidationReport> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut report = self.inner.validate(diff, base_ref, feature_ref)?;
        if call == self.target {
            report.fatal.push(Finding {
                code: "DEMO_FATAL".to_string(),
                file: String::new(),
                line: None,
                message: "forced fatal finding".to_string(),
            });
        }
        Ok(report)
    }
}

fn demo_steps(count: usize) -> Vec<StepInput> {
    (1..=count)
        .map(|n| StepInput::titled(&format!("Demo step {n}"), &format!("Record demo change {n}.")))
        .collect()
}

/// Start a demo run and drive it until it settles.
#[instrument(skip_all, fields(steps = options.steps))]
pub fn run_demo(options: &DemoOptions) -> Result<DemoReport> {
    options.config.validate().context("validate demo config")?;

    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(MemoryEventSink::new());
    let diff_validator = DiffValidator::new(options.config.validator.clone());
    let validator: Arc<dyn Validator> = match options.fatal_step {
        Some(target) => Arc::new(FatalOnCall {
            inner: diff_validator,
            target,
            calls: AtomicUsize::new(0),
        }),
        None => Arc::new(diff_validator),
    };
    let agents = Agents {
        planner: Arc::new(PassthroughPlanner),
        sub_planner: Arc::new(BasicSubPlanner),
        coder: Arc::new(CannedCoder::work_order_file()),
        validator,
        vcs: Arc::new(DryRunVcs::new()),
    };
    let orchestrator = Orchestrator::new(
        Stores::shared(store),
        agents,
        events.clone(),
        options.config.clone(),
    );

    let run_id = orchestrator.start_run(DEMO_REPO, DEMO_BASE_REF, demo_steps(options.steps))?;
    let outcome = run_loop(&orchestrator, &run_id, options.max_advances, |advance| {
        info!(step_id = %advance.step_id, state = %advance.state, "advanced");
    })?;

    let schema = EventSchema::new()?;
    let events = events.events();
    for event in &events {
        schema
            .validate_event(event)
            .with_context(|| format!("event {} for {run_id}", event.event_type.as_str()))?;
    }
    Ok(DemoReport { outcome, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looping::LoopStop;

    #[test]
    fn default_demo_completes() {
        let report = run_demo(&DemoOptions::default()).expect("demo");
        assert_eq!(report.outcome.stop, LoopStop::Completed);
        assert_eq!(report.outcome.advances, 2);
        let last = report.events.last().expect("events");
        assert_eq!(last.state, "completed");
    }

    #[test]
    fn fatal_step_pauses_the_run() {
        let options = DemoOptions {
            fatal_step: Some(1),
            ..DemoOptions::default()
        };
        let report = run_demo(&options).expect("demo");
        assert!(matches!(
            report.outcome.stop,
            LoopStop::Paused { step_id: Some(ref id) } if id.ends_with("-step-1")
        ));
    }

    #[test]
    fn auto_merge_ends_merged() {
        let mut options = DemoOptions {
            steps: 1,
            ..DemoOptions::default()
        };
        options.config.merge.auto = true;
        let report = run_demo(&options).expect("demo");
        assert_eq!(report.outcome.stop, LoopStop::Completed);
        assert!(report.events.iter().any(|event| event.state == "merged"));
    }

    #[test]
    fn zero_steps_is_a_control_error() {
        let options = DemoOptions {
            steps: 0,
            ..DemoOptions::default()
        };
        let err = run_demo(&options).expect_err("no steps");
        assert!(format!("{err:#}").contains("no steps"));
    }
}
