//! Run-level harness tests for full orchestration scenarios.
//!
//! These tests drive `Orchestrator::advance` over in-memory stores and a
//! dry-run VCS to verify end-to-end behavior: phase ordering, artifacts,
//! pull-request publication, pausing, failure policies and run completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use regex::Regex;
use serde_json::{Value, json};

use orchestrator::agents::{CannedCoder, Planner};
use orchestrator::core::events::LifecycleEventType;
use orchestrator::core::merge_policy::{
    MergeAction, MergeDecision, MergeRule, REASON_FATAL_VALIDATION,
};
use orchestrator::core::state::{RunState, StepState};
use orchestrator::core::work_order::{DEFAULT_DEPENDENCY_CONSTRAINT, ReturnFormat, WorkOrder};
use orchestrator::io::config::{OrchestratorConfig, StepFailurePolicy};
use orchestrator::io::events::EventSchema;
use orchestrator::io::memory::MemoryStore;
use orchestrator::io::store::ArtifactRepo;
use orchestrator::io::vcs::VcsCall;
use orchestrator::model::{
    ArtifactKind, NewArtifact, PlannerOutput, StepInput, StepRecord, ValidationReport,
};
use orchestrator::test_support::{Failing, Harness, fatal_report};

fn steps(titles: &[&str]) -> Vec<StepInput> {
    titles
        .iter()
        .map(|title| StepInput::titled(title, &format!("{title} body")))
        .collect()
}

fn step_states(harness: &Harness, run_id: &str) -> Vec<StepState> {
    harness
        .orchestrator
        .steps(run_id)
        .expect("steps")
        .iter()
        .map(|step| step.state)
        .collect()
}

fn run_status(harness: &Harness, run_id: &str) -> RunState {
    harness.orchestrator.run(run_id).expect("run").status
}

/// Two steps under manual merge: both end `pr_updated`, one pull request is
/// opened and then updated, and the run completes exactly once.
#[test]
fn two_steps_manual_merge_completes_run() {
    let harness = Harness::new();
    let run_id = harness.start(steps(&["First", "Second"]));
    assert_eq!(run_status(&harness, &run_id), RunState::Running);

    assert_eq!(
        harness.orchestrator.advance_step(&run_id).expect("advance"),
        StepState::PrUpdated
    );
    assert_eq!(run_status(&harness, &run_id), RunState::Running);
    assert_eq!(
        harness.orchestrator.advance_step(&run_id).expect("advance"),
        StepState::PrUpdated
    );

    assert_eq!(
        step_states(&harness, &run_id),
        vec![StepState::PrUpdated, StepState::PrUpdated]
    );
    assert_eq!(run_status(&harness, &run_id), RunState::Completed);

    let calls = harness.vcs.calls();
    let creates = calls
        .iter()
        .filter(|call| matches!(call, VcsCall::CreateOrUpdatePr { .. }))
        .count();
    let updates = calls
        .iter()
        .filter(|call| matches!(call, VcsCall::UpdatePrBody { number: 1 }))
        .count();
    assert_eq!((creates, updates), (1, 1));
    assert_eq!(harness.vcs.created_prs(), 1);

    for step_id in [format!("{run_id}-step-0"), format!("{run_id}-step-1")] {
        let diffs = harness
            .store
            .list_artifacts(&step_id)
            .into_iter()
            .filter(|stored| stored.artifact.kind == ArtifactKind::Diff)
            .count();
        assert_eq!(diffs, 1, "diff artifacts for {step_id}");
    }

    let err = harness.orchestrator.advance(&run_id).expect_err("drained");
    assert_eq!(err.code(), "no_pending_steps");
    let completions = harness
        .events
        .events_for_run(&run_id)
        .iter()
        .filter(|event| {
            event.event_type == LifecycleEventType::RunStatusChanged && event.state == "completed"
        })
        .count();
    assert_eq!(completions, 1);
}

#[test]
fn happy_path_emits_phase_events_in_order() {
    let harness = Harness::new();
    let run_id = harness.start(steps(&["Only"]));
    harness.orchestrator.advance(&run_id).expect("advance");

    let run = harness.orchestrator.run(&run_id).expect("run");
    let branch = Regex::new(r"^autogen/feature-[0-9a-f]{8}$").expect("regex");
    assert!(branch.is_match(&run.feature_ref), "{}", run.feature_ref);

    let events = harness.events.events_for_run(&run_id);
    let step_events: Vec<_> = events.iter().filter(|event| event.step_id.is_some()).collect();
    let states: Vec<&str> = step_events.iter().map(|event| event.state.as_str()).collect();
    assert_eq!(
        states,
        vec!["planned", "executing", "validating", "committing", "pr_updated"]
    );
    let types: Vec<&str> = step_events
        .iter()
        .map(|event| event.event_type.as_str())
        .collect();
    assert_eq!(
        types,
        vec![
            "step.planned",
            "step.executing",
            "step.validated",
            "step.committed",
            "step.committed"
        ]
    );
    for event in &step_events {
        assert!(event.duration_ms.is_some());
        assert_eq!(event.meta.as_ref().expect("meta")["step_index"], json!(0));
    }

    let last_step = step_events.last().expect("pr event");
    assert_eq!(last_step.meta_str("merge_action"), Some("manual"));

    let run_states: Vec<&str> = events
        .iter()
        .filter(|event| event.step_id.is_none())
        .map(|event| event.state.as_str())
        .collect();
    assert_eq!(run_states, vec!["running", "completed"]);
    assert_eq!(events[0].meta_str("from_state"), Some("queued"));

    let schema = EventSchema::new().expect("schema");
    for event in &events {
        schema.validate_event(event).expect("event matches schema");
    }
}

#[test]
fn pipeline_persists_plan_work_order_and_report() {
    let harness = Harness::new();
    let run_id = harness.start(steps(&["Add endpoint"]));
    harness.orchestrator.advance(&run_id).expect("advance");

    let step = &harness.orchestrator.steps(&run_id).expect("steps")[0];
    let plan = step.plan.as_ref().expect("plan");
    assert_eq!(plan["title"], json!("Add endpoint"));
    let order = step.work_order.as_ref().expect("work order");
    assert_eq!(order.work_order_id, step.id);
    assert_eq!(order.objective, "Add endpoint body");
    assert!(
        order
            .constraints
            .contains(&DEFAULT_DEPENDENCY_CONSTRAINT.to_string())
    );
    assert!(step.coder_result.is_some());

    let reports = harness.store.list_reports(&run_id);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report.step_id, step.id);

    let body = harness.vcs.pr_body(1).expect("pr body");
    assert!(body.contains("## Step: Add endpoint"));
    assert!(body.contains("Fatal issues: 0"));
}

#[test]
fn fatal_validation_pauses_step_and_run() {
    let harness = Harness::builder()
        .validator_reports(vec![fatal_report()])
        .build();
    let run_id = harness.start(steps(&["First", "Second"]));

    let advance = harness.orchestrator.advance(&run_id).expect("advance");
    assert_eq!(advance.state, StepState::Paused);
    assert_eq!(advance.step_id, format!("{run_id}-step-0"));
    assert_eq!(
        step_states(&harness, &run_id),
        vec![StepState::Paused, StepState::Queued]
    );
    assert_eq!(run_status(&harness, &run_id), RunState::Paused);
    assert!(harness.vcs.calls().is_empty());

    let events = harness.events.events_for_run(&run_id);
    let paused = events
        .iter()
        .find(|event| event.event_type == LifecycleEventType::StepPaused)
        .expect("paused event");
    assert_eq!(paused.meta_str("reason"), Some("validation_fatal"));
    let validated = events
        .iter()
        .find(|event| event.event_type == LifecycleEventType::StepValidated)
        .expect("validated event");
    assert_eq!(validated.meta.as_ref().expect("meta")["fatal"], json!(1));
    let last = events.last().expect("run event");
    assert_eq!(last.event_type, LifecycleEventType::RunStatusChanged);
    assert_eq!(last.state, "paused");
}

#[test]
fn resumed_run_replays_paused_step_from_planning() {
    let harness = Harness::builder()
        .validator_reports(vec![fatal_report()])
        .build();
    let run_id = harness.start(steps(&["First"]));
    harness.orchestrator.advance(&run_id).expect("advance");
    assert_eq!(run_status(&harness, &run_id), RunState::Paused);

    harness.orchestrator.resume_run(&run_id).expect("resume");
    let state = harness.orchestrator.advance_step(&run_id).expect("advance");
    assert_eq!(state, StepState::PrUpdated);
    assert_eq!(run_status(&harness, &run_id), RunState::Completed);

    let planned = harness
        .events
        .events_for_run(&run_id)
        .iter()
        .filter(|event| event.event_type == LifecycleEventType::StepPlanned)
        .count();
    assert_eq!(planned, 2);
    assert_eq!(harness.store.list_reports(&run_id).len(), 2);
}

#[test]
fn auto_merge_ends_merged() {
    let harness = Harness::builder().auto_merge().build();
    let run_id = harness.start(steps(&["Only"]));
    let state = harness.orchestrator.advance_step(&run_id).expect("advance");
    assert_eq!(state, StepState::Merged);
    assert_eq!(run_status(&harness, &run_id), RunState::Completed);

    let events = harness.events.events_for_run(&run_id);
    let merged = events
        .iter()
        .find(|event| event.state == "merged")
        .expect("merged event");
    assert_eq!(merged.event_type, LifecycleEventType::StepCommitted);
    assert_eq!(merged.meta_str("merge_action"), Some("auto"));
    assert_eq!(merged.meta.as_ref().expect("meta")["merge_reason"], Value::Null);
}

#[test]
fn empty_diff_records_zero_byte_artifact_without_notes() {
    let harness = Harness::builder()
        .coder(Arc::new(CannedCoder::fixed("", Some("   ".to_string()))))
        .build();
    let run_id = harness.start(steps(&["Nothing to do"]));
    let state = harness.orchestrator.advance_step(&run_id).expect("advance");
    assert_eq!(state, StepState::PrUpdated);

    let artifacts = harness.store.list_artifacts(&format!("{run_id}-step-0"));
    let diff = artifacts
        .iter()
        .find(|stored| stored.artifact.kind == ArtifactKind::Diff)
        .expect("diff artifact");
    assert_eq!(diff.artifact.content, "");
    assert_eq!(diff.artifact.meta["bytes"], json!(0));
    assert!(
        !artifacts
            .iter()
            .any(|stored| stored.artifact.meta.get("category") == Some(&json!("notes")))
    );

    let summary = artifacts
        .iter()
        .find(|stored| stored.artifact.content == "patch-summary")
        .expect("patch summary");
    assert_eq!(summary.artifact.meta["summary"]["changed_files"], json!(0));
}

#[test]
fn coder_notes_are_stored_as_doc_artifact() {
    let harness = Harness::new();
    let run_id = harness.start(steps(&["Only"]));
    harness.orchestrator.advance(&run_id).expect("advance");

    let notes = harness
        .store
        .list_artifacts(&format!("{run_id}-step-0"))
        .into_iter()
        .find(|stored| stored.artifact.meta.get("category") == Some(&json!("notes")))
        .expect("notes artifact");
    assert_eq!(notes.artifact.kind, ArtifactKind::Doc);
    assert!(notes.artifact.content.starts_with("Recorded work order"));
}

#[test]
fn settled_steps_leave_nothing_to_advance() {
    let harness = Harness::new();
    let run_id = harness.start(vec![StepInput {
        state: Some(StepState::Merged),
        ..StepInput::titled("Done already", "")
    }]);

    let err = harness.orchestrator.advance(&run_id).expect_err("no work");
    assert_eq!(err.code(), "no_pending_steps");
    assert_eq!(run_status(&harness, &run_id), RunState::Completed);
}

#[test]
fn empty_and_unknown_runs_are_control_errors() {
    let harness = Harness::new();
    let run_id = harness.start(Vec::new());
    let err = harness.orchestrator.advance(&run_id).expect_err("no steps");
    assert_eq!(err.code(), "no_steps_defined");

    let err = harness.orchestrator.advance("run-9999").expect_err("unknown");
    assert_eq!(err.code(), "run_not_found");
}

#[test]
fn coder_failure_marks_step_failed_and_leaves_run_running() {
    let harness = Harness::builder().failing_coder("model unavailable").build();
    let run_id = harness.start(steps(&["First", "Second"]));

    let advance = harness.orchestrator.advance(&run_id).expect("advance");
    assert_eq!(advance.state, StepState::Failed);
    assert_eq!(
        step_states(&harness, &run_id),
        vec![StepState::Failed, StepState::Queued]
    );
    assert_eq!(run_status(&harness, &run_id), RunState::Running);
    assert!(harness.store.list_artifacts(&advance.step_id).is_empty());

    let failed = harness
        .events
        .events_for_run(&run_id)
        .into_iter()
        .find(|event| event.event_type == LifecycleEventType::StepFailed)
        .expect("failed event");
    assert_eq!(failed.meta_str("error"), Some("coder_error"));
    assert!(
        failed
            .meta_str("message")
            .is_some_and(|message| message.contains("model unavailable"))
    );

    let next = harness.orchestrator.advance(&run_id).expect("advance");
    assert_eq!(next.step_id, format!("{run_id}-step-1"));
    assert_eq!(next.state, StepState::Failed);
    let err = harness.orchestrator.advance(&run_id).expect_err("stalled");
    assert_eq!(err.code(), "no_pending_steps");
    assert_eq!(run_status(&harness, &run_id), RunState::Running);
}

#[test]
fn planner_failure_is_classified() {
    let harness = Harness::builder()
        .planner(Arc::new(Failing::new("planner offline")))
        .build();
    let run_id = harness.start(steps(&["Only"]));
    harness.orchestrator.advance(&run_id).expect("advance");

    let failed = harness
        .events
        .events_for_run(&run_id)
        .into_iter()
        .find(|event| event.event_type == LifecycleEventType::StepFailed)
        .expect("failed event");
    assert_eq!(failed.meta_str("error"), Some("planner_error"));
    assert!(failed.duration_ms.is_some());
}

#[test]
fn failure_policy_can_pause_or_fail_the_run() {
    for (policy, expected) in [
        (StepFailurePolicy::PauseRun, RunState::Paused),
        (StepFailurePolicy::FailRun, RunState::Failed),
    ] {
        let mut config = OrchestratorConfig::default();
        config.failure.on_step_failure = policy;
        let harness = Harness::builder()
            .config(config)
            .failing_coder("boom")
            .build();
        let run_id = harness.start(steps(&["Only"]));
        harness.orchestrator.advance(&run_id).expect("advance");

        assert_eq!(run_status(&harness, &run_id), expected, "{policy:?}");
        let last = harness
            .events
            .events_for_run(&run_id)
            .pop()
            .expect("run event");
        assert_eq!(last.meta_str("reason"), Some("step_failed"));
        assert_eq!(last.meta_str("step_id"), Some(format!("{run_id}-step-0").as_str()));
    }
}

#[test]
fn store_failure_aborts_the_call() {
    let harness = Harness::builder()
        .artifacts(Arc::new(Failing::new("disk full")))
        .build();
    let run_id = harness.start(steps(&["Only"]));

    let err = harness.orchestrator.advance(&run_id).expect_err("store failure");
    assert_eq!(err.code(), "store_failure");
    assert!(err.to_string().contains("add_artifact"));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(step_states(&harness, &run_id), vec![StepState::Planned]);
    assert!(
        !harness
            .events
            .events_for_run(&run_id)
            .iter()
            .any(|event| event.event_type == LifecycleEventType::StepFailed)
    );
}

struct FinalizingPlanner;

impl Planner for FinalizingPlanner {
    fn plan_step(&self, step: &StepRecord) -> Result<PlannerOutput> {
        Ok(PlannerOutput::FinalizedWorkOrder(WorkOrder {
            work_order_id: step.id.clone(),
            title: format!("  {}  ", step.title),
            objective: "Ship it".to_string(),
            constraints: vec!["Keep the API stable".to_string()],
            acceptance_criteria: vec!["tests pass".to_string(), "tests pass".to_string()],
            context_files: Vec::new(),
            dependencies: vec!["serde".to_string()],
            return_format: ReturnFormat::UnifiedDiff,
        }))
    }
}

#[test]
fn finalized_work_orders_are_normalized_not_rebuilt() {
    let harness = Harness::builder()
        .planner(Arc::new(FinalizingPlanner))
        .build();
    let run_id = harness.start(steps(&["Finalized"]));
    harness.orchestrator.advance(&run_id).expect("advance");

    let step = &harness.orchestrator.steps(&run_id).expect("steps")[0];
    let order = step.work_order.as_ref().expect("work order");
    assert_eq!(order.title, "Finalized");
    assert_eq!(order.acceptance_criteria, vec!["tests pass".to_string()]);
    assert_eq!(
        order.constraints,
        vec![
            "Keep the API stable".to_string(),
            DEFAULT_DEPENDENCY_CONSTRAINT.to_string()
        ]
    );
    assert_eq!(order.dependencies, vec!["serde".to_string()]);
    assert_eq!(
        order.context_files,
        vec!["README.md".to_string(), "docs/starter-spec.md".to_string()]
    );
}

/// Artifact store whose first write fails.
#[derive(Default)]
struct FailsOnce {
    failed: AtomicBool,
    inner: MemoryStore,
}

impl ArtifactRepo for FailsOnce {
    fn add_artifact(&self, artifact: NewArtifact) -> Result<String> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            anyhow::bail!("connection reset");
        }
        self.inner.add_artifact(artifact)
    }
}

#[test]
fn step_resumes_from_persisted_work_order_after_store_failure() {
    let harness = Harness::builder()
        .artifacts(Arc::new(FailsOnce::default()))
        .build();
    let run_id = harness.start(steps(&["Only"]));

    let err = harness.orchestrator.advance(&run_id).expect_err("store failure");
    assert_eq!(err.code(), "store_failure");
    let step = &harness.orchestrator.steps(&run_id).expect("steps")[0];
    assert_eq!(step.state, StepState::Planned);
    assert!(step.work_order.is_some());

    let state = harness.orchestrator.advance_step(&run_id).expect("retry");
    assert_eq!(state, StepState::PrUpdated);
    assert_eq!(run_status(&harness, &run_id), RunState::Completed);

    let states: Vec<String> = harness
        .events
        .events_for_run(&run_id)
        .into_iter()
        .filter(|event| event.step_id.is_some())
        .map(|event| event.state)
        .collect();
    assert_eq!(
        states,
        vec!["planned", "executing", "validating", "committing", "pr_updated"]
    );
}

/// Blocks every merge regardless of the report.
struct AlwaysBlock;

impl MergeRule for AlwaysBlock {
    fn decide(
        &self,
        _config: &OrchestratorConfig,
        _report: &ValidationReport,
        _step: &StepRecord,
    ) -> MergeDecision {
        MergeDecision {
            action: MergeAction::Blocked,
            reason: Some(REASON_FATAL_VALIDATION),
        }
    }
}

#[test]
fn blocked_merge_pauses_step_and_run_after_publishing() {
    let harness = Harness::builder()
        .merge_policy(Arc::new(AlwaysBlock))
        .build();
    let run_id = harness.start(steps(&["First", "Second"]));

    let advance = harness.orchestrator.advance(&run_id).expect("advance");
    assert_eq!(advance.state, StepState::Paused);
    assert_eq!(
        step_states(&harness, &run_id),
        vec![StepState::Paused, StepState::Queued]
    );
    assert_eq!(run_status(&harness, &run_id), RunState::Paused);
    assert_eq!(harness.vcs.created_prs(), 1);

    let events = harness.events.events_for_run(&run_id);
    let run_paused = events
        .iter()
        .find(|event| {
            event.event_type == LifecycleEventType::RunStatusChanged && event.state == "paused"
        })
        .expect("run paused event");
    assert_eq!(run_paused.meta_str("reason"), Some("merge_blocked"));

    let last = events.last().expect("final step event");
    assert_eq!(last.step_id.as_deref(), Some(advance.step_id.as_str()));
    assert_eq!(last.state, "paused");
    assert_eq!(last.meta_str("merge_action"), Some("blocked"));
    assert_eq!(last.meta_str("merge_reason"), Some("fatal_validation"));
}

#[test]
fn pause_run_changes_only_run_status() {
    let harness = Harness::new();
    let run_id = harness.start(steps(&["First", "Second"]));
    harness.orchestrator.advance(&run_id).expect("advance");
    let before = step_states(&harness, &run_id);

    harness.orchestrator.pause_run(&run_id).expect("pause");
    assert_eq!(run_status(&harness, &run_id), RunState::Paused);
    assert_eq!(step_states(&harness, &run_id), before);

    let last = harness
        .events
        .events_for_run(&run_id)
        .pop()
        .expect("run event");
    assert_eq!(last.event_type, LifecycleEventType::RunStatusChanged);
    assert_eq!(last.state, "paused");
    assert!(last.step_id.is_none());

    let err = harness.orchestrator.pause_run("run-9999").expect_err("unknown");
    assert_eq!(err.code(), "run_not_found");
}
