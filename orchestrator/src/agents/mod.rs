//! Collaborator interfaces the engine delegates to, with reference
//! implementations.
//!
//! Every call is synchronous and blocks the caller. Collaborators report
//! failure through `anyhow::Error`; the engine records it on the step.

use anyhow::Result;

use crate::core::work_order::WorkOrder;
use crate::model::{CoderResult, Fields, PlannerOutput, StepRecord, ValidationReport};

pub mod coder;
pub mod planner;
pub mod sub_planner;
pub mod validator;

pub use coder::CannedCoder;
pub use planner::PassthroughPlanner;
pub use sub_planner::BasicSubPlanner;
pub use validator::DiffValidator;

pub trait Planner: Send + Sync {
    /// Plan `step`, returning either a raw plan or a finalized work order.
    fn plan_step(&self, step: &StepRecord) -> Result<PlannerOutput>;
}

pub trait SubPlanner: Send + Sync {
    /// Turn a raw plan payload into a canonical work order.
    fn build_work_order(&self, plan: &Fields) -> Result<WorkOrder>;
}

pub trait Coder: Send + Sync {
    fn execute(&self, work_order: &WorkOrder) -> Result<CoderResult>;
}

pub trait Validator: Send + Sync {
    fn validate(&self, diff: &str, base_ref: &str, feature_ref: &str) -> Result<ValidationReport>;
}
