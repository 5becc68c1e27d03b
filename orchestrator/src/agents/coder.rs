//! Coder with canned output.

use anyhow::{Context, Result};

use crate::agents::Coder;
use crate::core::work_order::WorkOrder;
use crate::model::CoderResult;

#[derive(Debug, Clone)]
enum Output {
    Fixed { diff: String, notes: Option<String> },
    /// One new markdown file per work order, describing it.
    WorkOrderFile,
}

/// Answers work orders without generating code.
#[derive(Debug, Clone)]
pub struct CannedCoder {
    output: Output,
}

impl CannedCoder {
    /// Return the same diff and notes for every work order.
    pub fn fixed(diff: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            output: Output::Fixed {
                diff: diff.into(),
                notes,
            },
        }
    }

    /// Add `docs/work-orders/<id>.md` with the work order's title and objective.
    pub fn work_order_file() -> Self {
        Self {
            output: Output::WorkOrderFile,
        }
    }
}

impl Coder for CannedCoder {
    fn execute(&self, work_order: &WorkOrder) -> Result<CoderResult> {
        let (diff, notes) = match &self.output {
            Output::Fixed { diff, notes } => (diff.clone(), notes.clone()),
            Output::WorkOrderFile => (
                work_order_file_diff(work_order),
                Some(format!("Recorded work order {}", work_order.work_order_id)),
            ),
        };
        CoderResult::new(work_order.work_order_id.clone(), diff, notes)
            .with_context(|| format!("coder output for {}", work_order.work_order_id))
    }
}

fn work_order_file_diff(work_order: &WorkOrder) -> String {
    let slug: String = work_order
        .work_order_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let path = format!("docs/work-orders/{slug}.md");
    format!(
        "diff --git a/{path} b/{path}\n\
new file mode 100644\n\
--- /dev/null\n\
+++ b/{path}\n\
@@ -0,0 +1,3 @@\n\
+# {title}\n\
+\n\
+{objective}\n",
        title = single_line(&work_order.title),
        objective = single_line(&work_order.objective),
    )
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
