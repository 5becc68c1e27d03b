//! Canonical work orders handed to the coding collaborator.
//!
//! A raw plan payload is parsed leniently into a [`WorkOrderDraft`] and then
//! finalized. Finalizing is the only way to build a [`WorkOrder`] from
//! untrusted input, so every work order the engine sees has a non-blank
//! title and objective, a dependency constraint, and a context allow-list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DEPENDENCY_CONSTRAINT: &str = "Do not add or modify dependencies.";
pub const DEFAULT_CONTEXT_ALLOWLIST: [&str; 2] = ["README.md", "docs/starter-spec.md"];

/// Phrasings that already express the default dependency constraint.
const DEPENDENCY_EQUIVALENTS: [&str; 2] = ["no new dependencies", "do not add dependencies"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnFormat {
    #[default]
    #[serde(rename = "unified-diff")]
    UnifiedDiff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub work_order_id: String,
    pub title: String,
    pub objective: String,
    pub constraints: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub context_files: Vec<String>,
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub return_format: ReturnFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkOrderError {
    #[error("work order requires a work_order_id")]
    MissingId,
    #[error("work order title cannot be blank")]
    BlankTitle,
    #[error("work order objective cannot be blank")]
    BlankObjective,
}

/// Leniently parsed plan payload, not yet checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkOrderDraft {
    pub work_order_id: Option<String>,
    pub title: Option<String>,
    pub objective: Option<String>,
    pub constraints: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub context_files: Vec<String>,
    pub dependencies: Vec<String>,
    pub allow_dependency_changes: bool,
}

impl WorkOrderDraft {
    pub fn from_plan(plan: &serde_json::Map<String, Value>) -> Self {
        let mut context_files = string_list(plan.get("context_files"));
        if let Some(Value::Object(hints)) = plan.get("hints") {
            context_files.extend(string_list(hints.get("files")));
            context_files.extend(string_list(hints.get("context_files")));
        }

        Self {
            work_order_id: text(plan.get("work_order_id")).or_else(|| text(plan.get("id"))),
            title: text(plan.get("title")),
            objective: text(plan.get("objective")).or_else(|| text(plan.get("body"))),
            constraints: string_list(plan.get("constraints")),
            acceptance_criteria: string_list(plan.get("acceptance_criteria")),
            context_files,
            dependencies: string_list(plan.get("dependencies")),
            allow_dependency_changes: plan
                .get("allow_dependency_changes")
                .is_some_and(truthy),
        }
    }

    pub fn finalize(self) -> Result<WorkOrder, WorkOrderError> {
        let work_order_id = self.work_order_id.ok_or(WorkOrderError::MissingId)?;
        let title = non_blank(self.title).ok_or(WorkOrderError::BlankTitle)?;
        let objective = non_blank(self.objective).ok_or(WorkOrderError::BlankObjective)?;

        let mut constraints = dedup(self.constraints);
        if !constraints.iter().any(|c| expresses_dependency_constraint(c)) {
            constraints.push(DEFAULT_DEPENDENCY_CONSTRAINT.to_string());
        }

        let mut context_files = dedup(self.context_files);
        if context_files.is_empty() {
            context_files = DEFAULT_CONTEXT_ALLOWLIST.map(String::from).to_vec();
        }

        let dependencies = if self.allow_dependency_changes {
            dedup(self.dependencies)
        } else {
            Vec::new()
        };

        Ok(WorkOrder {
            work_order_id,
            title,
            objective,
            constraints,
            acceptance_criteria: dedup(self.acceptance_criteria),
            context_files,
            dependencies,
            return_format: ReturnFormat::UnifiedDiff,
        })
    }
}

impl WorkOrder {
    /// Re-apply the finalization rules to an already-built work order.
    ///
    /// Dependencies a planner put on a finalized order count as approved.
    pub fn normalized(self) -> Result<WorkOrder, WorkOrderError> {
        WorkOrderDraft {
            work_order_id: non_blank(Some(self.work_order_id)),
            title: Some(self.title),
            objective: Some(self.objective),
            constraints: trimmed(self.constraints),
            acceptance_criteria: trimmed(self.acceptance_criteria),
            context_files: trimmed(self.context_files),
            dependencies: trimmed(self.dependencies),
            allow_dependency_changes: true,
        }
        .finalize()
    }
}

fn expresses_dependency_constraint(constraint: &str) -> bool {
    let lowered = constraint.to_lowercase();
    lowered.contains(&DEFAULT_DEPENDENCY_CONSTRAINT.to_lowercase())
        || DEPENDENCY_EQUIVALENTS
            .iter()
            .any(|phrase| lowered.contains(phrase))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn trimmed(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| non_blank(Some(value)))
        .collect()
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_blank(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|item| text(Some(item))).collect(),
        Some(other) => text(Some(other)).into_iter().collect(),
        None => Vec::new(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}
