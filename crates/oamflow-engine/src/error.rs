//! Error types for the execution engine

use thiserror::Error;

/// Errors surfaced by scheduling, generation, and operator actions
#[derive(Debug, Error)]
pub enum EngineError {
    /// No provider registered for a step type
    #[error("unknown step type {0:?}")]
    UnknownStepType(String),

    /// Run not found in the backing store
    #[error("workflow run {0} not found")]
    RunNotFound(String),

    /// Optimistic-concurrency conflict on the run object
    #[error("conflicting write to workflow run {0}")]
    Conflict(String),

    /// Named step does not exist in the run
    #[error("failed step {0} not found")]
    StepNotFound(String),

    /// Partial restart targets a step that is not failed
    #[error("can not restart from a non-failed step")]
    RestartNonFailedStep,

    /// Resume requested on a terminated run
    #[error("can not resume a terminated workflow")]
    ResumeTerminated,

    /// Rollback is not supported for workflow runs
    #[error("can not rollback a WorkflowRun")]
    RollbackUnsupported,

    /// Partial restart needs the inline step list
    #[error("workflow run {0} has no inline workflow spec")]
    MissingWorkflowSpec(String),

    /// Condition expression could not be evaluated
    #[error("invalid condition on step {step}: {source}")]
    InvalidCondition {
        step: String,
        #[source]
        source: minijinja::Error,
    },

    /// Provider dispatch error
    #[error(transparent)]
    Provider(#[from] oamflow_providers::ProviderError),

    /// Context store error
    #[error(transparent)]
    Context(#[from] oamflow_context::ContextError),

    /// Resource validation error
    #[error(transparent)]
    Api(#[from] oamflow_api::ApiError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
