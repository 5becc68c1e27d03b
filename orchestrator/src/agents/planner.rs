//! Planner that forwards the step as its own plan.

use anyhow::Result;
use serde_json::Value;

use crate::agents::Planner;
use crate::model::{PlannerOutput, StepRecord};

/// Builds a raw plan from the step record: caller-supplied inputs first,
/// then the step's identity, title and body (filling `objective` from the
/// body when the inputs do not name one).
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughPlanner;

impl Planner for PassthroughPlanner {
    fn plan_step(&self, step: &StepRecord) -> Result<PlannerOutput> {
        let mut plan = step.inputs.clone();
        plan.insert("id".to_string(), Value::String(step.id.clone()));
        plan.insert("index".to_string(), Value::from(step.index));
        plan.insert("title".to_string(), Value::String(step.title.clone()));
        plan.insert("body".to_string(), Value::String(step.body.clone()));
        plan.entry("objective")
            .or_insert_with(|| Value::String(step.body.clone()));
        Ok(PlannerOutput::RawPlan(plan))
    }
}
