//! Control errors raised by the orchestration engine.
//!
//! These are invariant violations or store failures that abort the current
//! call. Collaborator failures are not represented here: the engine records
//! them on the step (see [`crate::engine::StepFailure`]) and keeps going.

/// Error surfaced from an engine entry point.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("run `{run_id}` not found")]
    RunNotFound { run_id: String },

    #[error("run `{run_id}` has no steps defined")]
    NoStepsDefined { run_id: String },

    #[error("run `{run_id}` has no pending steps")]
    NoPendingSteps { run_id: String },

    #[error("work order missing for step `{step_id}` in run `{run_id}`")]
    WorkOrderMissing { run_id: String, step_id: String },

    #[error("coder result missing for step `{step_id}` in run `{run_id}`")]
    CoderResultMissing { run_id: String, step_id: String },

    #[error("unrecognized step state `{state}`")]
    InvalidStepState { state: String },

    #[error("store operation `{operation}` failed: {cause:#}")]
    Store {
        operation: &'static str,
        cause: anyhow::Error,
    },
}

impl OrchestratorError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::RunNotFound { .. } => "run_not_found",
            OrchestratorError::NoStepsDefined { .. } => "no_steps_defined",
            OrchestratorError::NoPendingSteps { .. } => "no_pending_steps",
            OrchestratorError::WorkOrderMissing { .. } => "work_order_missing",
            OrchestratorError::CoderResultMissing { .. } => "coder_result_missing",
            OrchestratorError::InvalidStepState { .. } => "invalid_step_state",
            OrchestratorError::Store { .. } => "store_failure",
        }
    }
}

/// Attach a store operation name to a repository result.
pub(crate) trait StoreResultExt<T> {
    fn store_op(self, operation: &'static str) -> Result<T, OrchestratorError>;
}

impl<T> StoreResultExt<T> for anyhow::Result<T> {
    fn store_op(self, operation: &'static str) -> Result<T, OrchestratorError> {
        self.map_err(|cause| OrchestratorError::Store { operation, cause })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn store_errors_keep_operation_and_cause() {
        let result: anyhow::Result<()> = Err(anyhow!("disk full"));
        let err = result.store_op("create_steps").unwrap_err();
        assert_eq!(err.code(), "store_failure");
        assert_eq!(
            err.to_string(),
            "store operation `create_steps` failed: disk full"
        );
    }
}
