//! Sub-planner that normalizes raw plans into work orders.

use anyhow::{Context, Result};
use tracing::debug;

use crate::agents::SubPlanner;
use crate::core::work_order::{WorkOrder, WorkOrderDraft};
use crate::model::Fields;

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSubPlanner;

impl SubPlanner for BasicSubPlanner {
    fn build_work_order(&self, plan: &Fields) -> Result<WorkOrder> {
        let draft = WorkOrderDraft::from_plan(plan);
        let order = draft.finalize().context("build work order from plan")?;
        debug!(
            work_order_id = %order.work_order_id,
            constraints = order.constraints.len(),
            context_files = order.context_files.len(),
            "built work order"
        );
        Ok(order)
    }
}
