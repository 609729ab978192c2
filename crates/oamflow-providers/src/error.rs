//! Error types for provider dispatch

use thiserror::Error;

/// Errors that can occur when resolving or running a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider registered for a step type
    #[error("no provider registered for step type {0:?}")]
    NotFound(String),

    /// Step properties were missing or malformed
    #[error("invalid properties for step {step}: {message}")]
    InvalidProperties { step: String, message: String },

    /// Provider failed in a way that is not a step-phase decision
    #[error("provider execution failed: {0}")]
    ExecutionFailed(String),

    /// Context error while reading or writing shared state
    #[error(transparent)]
    Context(#[from] oamflow_context::ContextError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
