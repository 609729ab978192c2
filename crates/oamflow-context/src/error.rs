//! Error types for workflow context operations

use thiserror::Error;

/// Errors that can occur while reading or persisting a workflow context
#[derive(Debug, Error)]
pub enum ContextError {
    /// Component not found in the run's context
    #[error("component {0} not found in application")]
    ComponentNotFound(String),

    /// Backing object not found
    #[error("config map {namespace}/{name} not found")]
    StoreNotFound { namespace: String, name: String },

    /// Optimistic-concurrency conflict on the backing object
    #[error("conflicting write to config map {0}")]
    Conflict(String),

    /// A vars path descends through a non-object value
    #[error("path {path:?} blocked by non-object value")]
    InvalidPath { path: String },

    /// Expression could not be compiled into a value
    #[error("invalid value expression: {0}")]
    InvalidExpression(#[source] serde_json::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Component manifest could not be decoded
    #[error("decode component {name}: {message}")]
    DecodeComponent { name: String, message: String },
}

/// Result type for context operations
pub type Result<T> = std::result::Result<T, ContextError>;
