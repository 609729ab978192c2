//! Error types for resource validation and serialization

use thiserror::Error;

/// Errors that can occur when working with workflow resources
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value
    #[error("Invalid value for field '{field}': {message}")]
    InvalidFieldValue { field: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for resource operations
pub type Result<T> = std::result::Result<T, ApiError>;
