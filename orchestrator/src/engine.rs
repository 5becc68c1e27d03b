//! The orchestration engine.
//!
//! [`Orchestrator::advance`] selects the earliest unsettled step of a run and
//! drives it through the lifecycle table one hop at a time, delegating each
//! phase to a collaborator:
//!
//! ```text
//! queued → planned → executing → validating → committing → pr_updated → {merged | pr_updated | paused}
//!                                     │
//!                                     └─ fatal findings → paused (step and run)
//! ```
//!
//! Collaborator failures are step-scoped: the step is marked failed and the
//! call returns `failed`. Repository failures and invariant violations are
//! [`OrchestratorError`]s and abort the call; the next call resumes the step
//! from its persisted state.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use crate::agents::{Coder, Planner, SubPlanner, Validator};
use crate::core::branch::derive_feature_branch;
use crate::core::events::LifecycleEvent;
use crate::core::lifecycle::{LifecycleTracker, PhaseTransition, StepLifecycle};
use crate::core::merge_policy::{MergeAction, MergeDecision, MergePolicy, MergeRule};
use crate::core::selector::{first_pending_step, is_run_complete};
use crate::core::state::{RunState, StepState};
use crate::core::work_order::WorkOrder;
use crate::error::{OrchestratorError, StoreResultExt};
use crate::io::config::{OrchestratorConfig, StepFailurePolicy};
use crate::io::events::EventSink;
use crate::io::pr_body::{PrBodyRenderer, pr_title};
use crate::io::store::{ArtifactRepo, PrBindingRepo, RunRepo, StepRepo, ValidationReportRepo};
use crate::io::vcs::VcsClient;
use crate::model::{
    ArtifactKind, CoderResult, Fields, NewArtifact, NewRun, PlannerOutput, PrBinding, RunRecord,
    StepInput, StepMetadataUpdate, StepRecord, ValidationReport, to_fields,
};

/// Repositories the engine persists through.
#[derive(Clone)]
pub struct Stores {
    pub runs: Arc<dyn RunRepo>,
    pub steps: Arc<dyn StepRepo>,
    pub artifacts: Arc<dyn ArtifactRepo>,
    pub reports: Arc<dyn ValidationReportRepo>,
    pub pr_bindings: Arc<dyn PrBindingRepo>,
}

impl Stores {
    /// Use one store for every repository.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: RunRepo + StepRepo + ArtifactRepo + ValidationReportRepo + PrBindingRepo + 'static,
    {
        Self {
            runs: store.clone(),
            steps: store.clone(),
            artifacts: store.clone(),
            reports: store.clone(),
            pr_bindings: store,
        }
    }
}

/// Collaborators the engine delegates phases to.
#[derive(Clone)]
pub struct Agents {
    pub planner: Arc<dyn Planner>,
    pub sub_planner: Arc<dyn SubPlanner>,
    pub coder: Arc<dyn Coder>,
    pub validator: Arc<dyn Validator>,
    pub vcs: Arc<dyn VcsClient>,
}

/// The collaborator a step failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Planner,
    SubPlanner,
    Coder,
    Validator,
    Vcs,
}

impl Collaborator {
    /// Error class recorded in the failed event.
    pub fn error_class(self) -> &'static str {
        match self {
            Collaborator::Planner => "planner_error",
            Collaborator::SubPlanner => "sub_planner_error",
            Collaborator::Coder => "coder_error",
            Collaborator::Validator => "validator_error",
            Collaborator::Vcs => "vcs_error",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.error_class())
    }
}

/// A collaborator failure captured while driving a step.
#[derive(Debug)]
pub struct StepFailure {
    pub collaborator: Collaborator,
    pub cause: anyhow::Error,
}

fn failed(collaborator: Collaborator) -> impl FnOnce(anyhow::Error) -> PhaseError {
    move |cause| {
        PhaseError::Step(StepFailure {
            collaborator,
            cause,
        })
    }
}

/// Why a step was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    ValidationFatal,
    MergeBlocked,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseReason::ValidationFatal => "validation_fatal",
            PauseReason::MergeBlocked => "merge_blocked",
        }
    }
}

/// Result of one phase of the step pipeline.
#[derive(Debug)]
pub enum PhaseOutcome {
    /// Phase done, move to the next state in the table.
    Continue,
    /// The step and run were paused.
    Paused(PauseReason),
    /// The pipeline ended in this state.
    Settled(StepState),
    /// A collaborator failed; the step must be marked failed.
    Failed(StepFailure),
}

enum PhaseError {
    Step(StepFailure),
    Control(OrchestratorError),
}

impl From<OrchestratorError> for PhaseError {
    fn from(err: OrchestratorError) -> Self {
        PhaseError::Control(err)
    }
}

/// The step an `advance` call moved and where it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepAdvance {
    pub step_id: String,
    pub state: StepState,
}

/// Per-advance state; never persisted.
struct StepContext {
    run: RunRecord,
    step: StepRecord,
    position: usize,
    tracker: LifecycleTracker,
    work_order: Option<WorkOrder>,
    coder_result: Option<CoderResult>,
    report: Option<ValidationReport>,
}

impl StepContext {
    fn run_id(&self) -> &str {
        &self.run.id
    }

    fn step_id(&self) -> &str {
        &self.step.id
    }

    fn meta(&self, extra: &[(&str, Value)]) -> Fields {
        let mut meta = Fields::new();
        meta.insert("step_index".to_string(), Value::from(self.position));
        for (key, value) in extra {
            meta.insert((*key).to_string(), value.clone());
        }
        meta
    }
}

pub struct Orchestrator {
    stores: Stores,
    agents: Agents,
    events: Arc<dyn EventSink>,
    config: OrchestratorConfig,
    lifecycle: StepLifecycle,
    merge_policy: Arc<dyn MergeRule>,
    pr_body: PrBodyRenderer,
}

impl Orchestrator {
    pub fn new(
        stores: Stores,
        agents: Agents,
        events: Arc<dyn EventSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            stores,
            agents,
            events,
            config,
            lifecycle: StepLifecycle::default(),
            merge_policy: Arc::new(MergePolicy),
            pr_body: PrBodyRenderer::new(),
        }
    }

    /// Replace the transition table.
    pub fn with_lifecycle(mut self, lifecycle: StepLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Replace the merge policy.
    pub fn with_merge_policy(mut self, merge_policy: Arc<dyn MergeRule>) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn run(&self, run_id: &str) -> Result<RunRecord, OrchestratorError> {
        self.stores
            .runs
            .get_run(run_id)
            .store_op("get_run")?
            .ok_or_else(|| OrchestratorError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    pub fn steps(&self, run_id: &str) -> Result<Vec<StepRecord>, OrchestratorError> {
        self.stores.steps.list_steps(run_id).store_op("list_steps")
    }

    /// Create a run with `steps` and move it to running.
    #[instrument(skip(self, steps), fields(steps = steps.len()))]
    pub fn start_run(
        &self,
        repo: &str,
        base_ref: &str,
        steps: Vec<StepInput>,
    ) -> Result<String, OrchestratorError> {
        let feature_ref =
            derive_feature_branch(&self.config.feature_branch, &mut rand::thread_rng());
        let run_id = self
            .stores
            .runs
            .create_run(NewRun {
                repo: repo.to_string(),
                base_ref: base_ref.to_string(),
                feature_ref: feature_ref.clone(),
                status: RunState::Queued,
                config: self.config.clone(),
            })
            .store_op("create_run")?;

        let now = Utc::now();
        let records = steps
            .into_iter()
            .enumerate()
            .map(|(position, input)| StepRecord::from_input(&run_id, position, input, now))
            .collect();
        self.stores
            .steps
            .create_steps(&run_id, records)
            .store_op("create_steps")?;

        let meta = meta_of(&[("from_state", json!(RunState::Queued.as_str()))]);
        self.set_run_state(&run_id, RunState::Running, Some(meta))?;
        info!(run_id = %run_id, feature_ref = %feature_ref, "run started");
        Ok(run_id)
    }

    #[instrument(skip(self))]
    pub fn pause_run(&self, run_id: &str) -> Result<(), OrchestratorError> {
        self.run(run_id)?;
        self.set_run_state(run_id, RunState::Paused, None)
    }

    #[instrument(skip(self))]
    pub fn resume_run(&self, run_id: &str) -> Result<(), OrchestratorError> {
        self.run(run_id)?;
        self.set_run_state(run_id, RunState::Running, None)
    }

    /// Drive the next pending step of `run_id` and return its resulting state.
    pub fn advance_step(&self, run_id: &str) -> Result<StepState, OrchestratorError> {
        self.advance(run_id).map(|advance| advance.state)
    }

    /// Like [`Orchestrator::advance_step`], also reporting which step moved.
    #[instrument(skip(self))]
    pub fn advance(&self, run_id: &str) -> Result<StepAdvance, OrchestratorError> {
        let run = self.run(run_id)?;
        let steps = self.steps(run_id)?;
        if steps.is_empty() {
            return Err(OrchestratorError::NoStepsDefined {
                run_id: run_id.to_string(),
            });
        }

        let Some(step) = first_pending_step(&steps).cloned() else {
            self.maybe_complete_run(run_id, &steps)?;
            return Err(OrchestratorError::NoPendingSteps {
                run_id: run_id.to_string(),
            });
        };
        let position = steps
            .iter()
            .position(|candidate| candidate.id == step.id)
            .unwrap_or(step.index);
        let step_id = step.id.clone();
        debug!(step_id = %step_id, state = %step.state, "selected step");

        // A step left mid-pipeline by an aborted call resumes from what it persisted.
        let mut ctx = StepContext {
            work_order: step.work_order.clone(),
            coder_result: step.coder_result.clone(),
            run,
            step,
            position,
            tracker: LifecycleTracker::new(),
            report: None,
        };
        let state = match self.drive_step(&mut ctx)? {
            Ok(state) => state,
            Err(failure) => {
                self.fail_step(&ctx, failure)?;
                return Ok(StepAdvance {
                    step_id,
                    state: StepState::Failed,
                });
            }
        };

        let steps = self.steps(run_id)?;
        self.maybe_complete_run(run_id, &steps)?;
        Ok(StepAdvance { step_id, state })
    }

    /// Walk the lifecycle table from the step's current state.
    ///
    /// A paused step restarts from `queued`. The walk ends when a phase
    /// settles, pauses or fails, or when the table has no successor.
    fn drive_step(
        &self,
        ctx: &mut StepContext,
    ) -> Result<Result<StepState, StepFailure>, OrchestratorError> {
        let mut current = match ctx.step.state {
            StepState::Paused => StepState::Queued,
            state => state,
        };

        while let Some(next) = self.lifecycle.next(current) {
            ctx.tracker.start(next);
            let Some(outcome) = self.run_phase(next, ctx)? else {
                // Only reachable with a custom table.
                warn!(state = %next, "no phase handler for state");
                break;
            };
            match outcome {
                PhaseOutcome::Continue => current = next,
                PhaseOutcome::Paused(reason) => {
                    debug!(step_id = %ctx.step.id, reason = reason.as_str(), "step paused");
                    return Ok(Ok(StepState::Paused));
                }
                PhaseOutcome::Settled(state) => return Ok(Ok(state)),
                PhaseOutcome::Failed(failure) => return Ok(Err(failure)),
            }
        }
        Ok(Ok(current))
    }

    fn run_phase(
        &self,
        next: StepState,
        ctx: &mut StepContext,
    ) -> Result<Option<PhaseOutcome>, OrchestratorError> {
        let result = match next {
            StepState::Planned => self.plan_phase(ctx),
            StepState::Executing => self.execute_phase(ctx),
            StepState::Validating => self.validate_phase(ctx),
            StepState::Committing => self.commit_phase(ctx),
            StepState::PrUpdated => self.pr_phase(ctx),
            StepState::Queued | StepState::Merged | StepState::Paused | StepState::Failed => {
                return Ok(None);
            }
        };
        match result {
            Ok(outcome) => Ok(Some(outcome)),
            Err(PhaseError::Step(failure)) => Ok(Some(PhaseOutcome::Failed(failure))),
            Err(PhaseError::Control(err)) => Err(err),
        }
    }

    fn plan_phase(&self, ctx: &mut StepContext) -> Result<PhaseOutcome, PhaseError> {
        let output = self
            .agents
            .planner
            .plan_step(&ctx.step)
            .map_err(failed(Collaborator::Planner))?;

        let (plan, work_order) = match output {
            PlannerOutput::FinalizedWorkOrder(order) => {
                let order = order
                    .normalized()
                    .map_err(anyhow::Error::from)
                    .map_err(failed(Collaborator::Planner))?;
                let plan = to_fields(&order).map_err(failed(Collaborator::Planner))?;
                (plan, order)
            }
            PlannerOutput::RawPlan(plan) => {
                let order = self
                    .agents
                    .sub_planner
                    .build_work_order(&plan)
                    .map_err(failed(Collaborator::SubPlanner))?;
                (plan, order)
            }
        };

        self.stores
            .steps
            .update_step_metadata(
                ctx.run_id(),
                ctx.step_id(),
                StepMetadataUpdate {
                    plan: Some(plan),
                    work_order: Some(work_order.clone()),
                    coder_result: None,
                },
            )
            .store_op("update_step_metadata")?;
        ctx.work_order = Some(work_order);
        self.complete_phase(ctx, StepState::Planned, &[])?;
        Ok(PhaseOutcome::Continue)
    }

    fn execute_phase(&self, ctx: &mut StepContext) -> Result<PhaseOutcome, PhaseError> {
        let work_order = ctx
            .work_order
            .as_ref()
            .ok_or_else(|| OrchestratorError::WorkOrderMissing {
                run_id: ctx.run.id.clone(),
                step_id: ctx.step.id.clone(),
            })?;
        let result = self
            .agents
            .coder
            .execute(work_order)
            .map_err(failed(Collaborator::Coder))?;
        result
            .check()
            .map_err(anyhow::Error::from)
            .map_err(failed(Collaborator::Coder))?;

        self.stores
            .steps
            .update_step_metadata(
                ctx.run_id(),
                ctx.step_id(),
                StepMetadataUpdate {
                    coder_result: Some(result.clone()),
                    ..StepMetadataUpdate::default()
                },
            )
            .store_op("update_step_metadata")?;

        self.add_artifact(
            ctx,
            ArtifactKind::Diff,
            result.diff.clone(),
            meta_of(&[("bytes", Value::from(result.diff.len()))]),
        )?;
        if let Some(notes) = result.notes() {
            self.add_artifact(
                ctx,
                ArtifactKind::Doc,
                notes.to_string(),
                meta_of(&[("category", json!("notes"))]),
            )?;
        }

        ctx.coder_result = Some(result);
        self.complete_phase(ctx, StepState::Executing, &[])?;
        Ok(PhaseOutcome::Continue)
    }

    fn validate_phase(&self, ctx: &mut StepContext) -> Result<PhaseOutcome, PhaseError> {
        let diff = self.coder_diff(ctx)?;
        let mut report = self
            .agents
            .validator
            .validate(&diff, &ctx.run.base_ref, &ctx.run.feature_ref)
            .map_err(failed(Collaborator::Validator))?;
        report.step_id = ctx.step.id.clone();

        self.stores
            .reports
            .add_report(ctx.run_id(), &report)
            .store_op("add_report")?;
        let fatal = report.fatal.len();
        ctx.report = Some(report);
        self.complete_phase(ctx, StepState::Validating, &[("fatal", Value::from(fatal))])?;

        if fatal == 0 {
            return Ok(PhaseOutcome::Continue);
        }
        warn!(
            run_id = %ctx.run.id,
            step_id = %ctx.step.id,
            fatal,
            "fatal validation findings"
        );
        self.pause_step(ctx, PauseReason::ValidationFatal)?;
        Ok(PhaseOutcome::Paused(PauseReason::ValidationFatal))
    }

    fn commit_phase(&self, ctx: &mut StepContext) -> Result<PhaseOutcome, PhaseError> {
        let diff = self.coder_diff(ctx)?;
        let vcs = &self.agents.vcs;
        vcs.ensure_branch(&ctx.run.base_ref, &ctx.run.feature_ref)
            .map_err(failed(Collaborator::Vcs))?;
        let summary = vcs
            .apply_patch(&ctx.run.feature_ref, &diff)
            .map_err(failed(Collaborator::Vcs))?;

        let summary = json!({
            "changed_files": summary.changed_files,
            "additions": summary.additions,
            "deletions": summary.deletions,
        });
        self.add_artifact(
            ctx,
            ArtifactKind::Doc,
            "patch-summary".to_string(),
            meta_of(&[("summary", summary.clone())]),
        )?;
        self.complete_phase(ctx, StepState::Committing, &[("patch", summary)])?;
        Ok(PhaseOutcome::Continue)
    }

    fn pr_phase(&self, ctx: &mut StepContext) -> Result<PhaseOutcome, PhaseError> {
        let report = ctx
            .report
            .clone()
            .unwrap_or_else(|| ValidationReport::placeholder(&ctx.step.id));
        let body = self
            .pr_body
            .render(&ctx.step, &report)
            .map_err(failed(Collaborator::Vcs))?;
        self.publish_pr(&ctx.run, &ctx.step, &body)?;
        self.set_step_state(ctx, StepState::PrUpdated)?;

        let decision = self
            .merge_policy
            .decide(&ctx.run.config, &report, &ctx.step);
        let final_state = match decision.action {
            MergeAction::Auto => {
                self.set_step_state(ctx, StepState::Merged)?;
                StepState::Merged
            }
            MergeAction::Blocked => {
                self.set_step_state(ctx, StepState::Paused)?;
                let reason = json!(PauseReason::MergeBlocked.as_str());
                let meta = meta_of(&[("reason", reason)]);
                self.set_run_state(&ctx.run.id, RunState::Paused, Some(meta))?;
                StepState::Paused
            }
            MergeAction::Manual => StepState::PrUpdated,
        };

        let transition = ctx.tracker.finish(StepState::PrUpdated);
        let meta = ctx.meta(&merge_meta(&decision));
        self.emit_step_event(
            ctx,
            PhaseTransition {
                state: final_state,
                ..transition
            },
            meta,
        );

        if final_state == StepState::Paused {
            return Ok(PhaseOutcome::Paused(PauseReason::MergeBlocked));
        }
        Ok(PhaseOutcome::Settled(final_state))
    }

    /// Update the run's pull request, opening and binding one on first use.
    fn publish_pr(
        &self,
        run: &RunRecord,
        step: &StepRecord,
        body: &str,
    ) -> Result<(), PhaseError> {
        let binding = self
            .stores
            .pr_bindings
            .get_binding(&run.id)
            .store_op("get_binding")?;
        if let Some(binding) = binding {
            self.agents
                .vcs
                .update_pr_body(binding.pr_number, body)
                .map_err(failed(Collaborator::Vcs))?;
            debug!(pr_number = binding.pr_number, "updated pull request body");
            return Ok(());
        }

        let title = pr_title(&step.title, &run.repo);
        let pr = self
            .agents
            .vcs
            .create_or_update_pr(&title, body, &run.feature_ref, &run.base_ref)
            .map_err(failed(Collaborator::Vcs))?;
        info!(run_id = %run.id, pr_number = pr.number, pr_url = %pr.url, "opened pull request");
        self.stores
            .pr_bindings
            .upsert_binding(PrBinding {
                run_id: run.id.clone(),
                pr_number: pr.number,
                pr_url: pr.url,
                head: run.feature_ref.clone(),
                base: run.base_ref.clone(),
            })
            .store_op("upsert_binding")?;
        Ok(())
    }

    fn coder_diff(&self, ctx: &StepContext) -> Result<String, OrchestratorError> {
        ctx.coder_result
            .as_ref()
            .map(|result| result.diff.clone())
            .ok_or_else(|| OrchestratorError::CoderResultMissing {
                run_id: ctx.run.id.clone(),
                step_id: ctx.step.id.clone(),
            })
    }

    /// Persist `state`, close its phase, and emit the step event.
    fn complete_phase(
        &self,
        ctx: &mut StepContext,
        state: StepState,
        extra: &[(&str, Value)],
    ) -> Result<(), OrchestratorError> {
        self.set_step_state(ctx, state)?;
        let transition = ctx.tracker.finish(state);
        let meta = ctx.meta(extra);
        self.emit_step_event(ctx, transition, meta);
        Ok(())
    }

    fn pause_step(
        &self,
        ctx: &mut StepContext,
        reason: PauseReason,
    ) -> Result<(), OrchestratorError> {
        self.set_step_state(ctx, StepState::Paused)?;
        self.stores
            .runs
            .update_run_state(&ctx.run.id, RunState::Paused)
            .store_op("update_run_state")?;
        let transition = ctx.tracker.finish(StepState::Paused);
        let meta = ctx.meta(&[("reason", json!(reason.as_str()))]);
        self.emit_step_event(ctx, transition, meta);
        self.emit_run_state(
            &ctx.run.id,
            RunState::Paused,
            Some(meta_of(&[("reason", json!(reason.as_str()))])),
        );
        Ok(())
    }

    /// Mark the step failed and apply the run's failure policy.
    fn fail_step(&self, ctx: &StepContext, failure: StepFailure) -> Result<(), OrchestratorError> {
        let run_id = ctx.run_id();
        let step_id = ctx.step_id();
        error!(
            run_id,
            step_id,
            phase = StepState::Failed.as_str(),
            collaborator = %failure.collaborator,
            error = %format!("{:#}", failure.cause),
            "step failed"
        );
        self.stores
            .steps
            .update_step_state(run_id, step_id, StepState::Failed)
            .store_op("update_step_state")?;

        let transition = PhaseTransition::instant(StepState::Failed, Utc::now());
        let meta = meta_of(&[
            ("error", json!(failure.collaborator.error_class())),
            ("message", json!(format!("{:#}", failure.cause))),
        ]);
        self.emit_step_event(ctx, transition, meta);

        let target = match ctx.run.config.failure.on_step_failure {
            StepFailurePolicy::LeaveRunning => return Ok(()),
            StepFailurePolicy::PauseRun => RunState::Paused,
            StepFailurePolicy::FailRun => RunState::Failed,
        };
        self.set_run_state(
            run_id,
            target,
            Some(meta_of(&[
                ("reason", json!("step_failed")),
                ("step_id", json!(step_id)),
            ])),
        )
    }

    /// Complete the run once every step is merged or awaiting manual merge.
    fn maybe_complete_run(
        &self,
        run_id: &str,
        steps: &[StepRecord],
    ) -> Result<bool, OrchestratorError> {
        if !is_run_complete(steps) {
            return Ok(false);
        }
        if self.run(run_id)?.status == RunState::Completed {
            return Ok(false);
        }
        self.set_run_state(run_id, RunState::Completed, None)?;
        info!(run_id, "run completed");
        Ok(true)
    }

    fn set_step_state(
        &self,
        ctx: &mut StepContext,
        state: StepState,
    ) -> Result<(), OrchestratorError> {
        self.stores
            .steps
            .update_step_state(&ctx.run.id, &ctx.step.id, state)
            .store_op("update_step_state")?;
        ctx.step.state = state;
        Ok(())
    }

    fn set_run_state(
        &self,
        run_id: &str,
        state: RunState,
        meta: Option<Fields>,
    ) -> Result<(), OrchestratorError> {
        self.stores
            .runs
            .update_run_state(run_id, state)
            .store_op("update_run_state")?;
        self.emit_run_state(run_id, state, meta);
        Ok(())
    }

    fn add_artifact(
        &self,
        ctx: &StepContext,
        kind: ArtifactKind,
        content: String,
        meta: Fields,
    ) -> Result<String, OrchestratorError> {
        self.stores
            .artifacts
            .add_artifact(NewArtifact {
                run_id: ctx.run.id.clone(),
                step_id: ctx.step.id.clone(),
                kind,
                content,
                meta,
            })
            .store_op("add_artifact")
    }

    fn emit_step_event(&self, ctx: &StepContext, transition: PhaseTransition, meta: Fields) {
        let event = LifecycleEvent::for_step(ctx.run_id(), ctx.step_id(), &transition, Some(meta));
        let Some(event) = event else {
            return;
        };
        info!(
            run_id = ctx.run_id(),
            step_id = ctx.step_id(),
            phase = transition.state.as_str(),
            duration_ms = transition.duration_ms(),
            "step state changed"
        );
        self.events.publish(&event);
    }

    fn emit_run_state(&self, run_id: &str, state: RunState, meta: Option<Fields>) {
        info!(run_id, phase = state.as_str(), "run state changed");
        self.events
            .publish(&LifecycleEvent::run_status(run_id, state, meta));
    }
}

fn meta_of(entries: &[(&str, Value)]) -> Fields {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}

fn merge_meta(decision: &MergeDecision) -> [(&'static str, Value); 2] {
    [
        ("merge_action", json!(decision.action.as_str())),
        ("merge_reason", json!(decision.reason)),
    ]
}
