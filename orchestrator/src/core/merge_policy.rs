//! Merge decision taken once a step's pull request is up to date.

use serde::{Deserialize, Serialize};

use crate::io::config::OrchestratorConfig;
use crate::model::{StepRecord, ValidationReport};

pub const REASON_FATAL_VALIDATION: &str = "fatal_validation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    Auto,
    Blocked,
    Manual,
}

impl MergeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeAction::Auto => "auto",
            MergeAction::Blocked => "blocked",
            MergeAction::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeDecision {
    pub action: MergeAction,
    pub reason: Option<&'static str>,
}

/// Merge decision seam used by the engine.
pub trait MergeRule: Send + Sync {
    fn decide(
        &self,
        config: &OrchestratorConfig,
        report: &ValidationReport,
        step: &StepRecord,
    ) -> MergeDecision;
}

/// Stateless merge policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergePolicy;

impl MergePolicy {
    /// Decide how to merge `step`.
    ///
    /// Fatal findings always block, otherwise `merge.auto` picks between
    /// automatic and manual merging. The step itself is not consulted.
    pub fn evaluate(
        &self,
        config: &OrchestratorConfig,
        report: &ValidationReport,
        _step: &StepRecord,
    ) -> MergeDecision {
        if report.has_fatal() {
            return MergeDecision {
                action: MergeAction::Blocked,
                reason: Some(REASON_FATAL_VALIDATION),
            };
        }
        let action = if config.merge.auto {
            MergeAction::Auto
        } else {
            MergeAction::Manual
        };
        MergeDecision {
            action,
            reason: None,
        }
    }
}

impl MergeRule for MergePolicy {
    fn decide(
        &self,
        config: &OrchestratorConfig,
        report: &ValidationReport,
        step: &StepRecord,
    ) -> MergeDecision {
        self.evaluate(config, report, step)
    }
}
