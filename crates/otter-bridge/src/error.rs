//! Error types for bridge operations
//!
//! Disposed-template use is not an error: instantiating or
//! wrapping through a disposed template is a defined "nothing produced"
//! outcome, reported as `None` or `false` rather than an error.

use thiserror::Error;

use crate::value::ValueKind;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Structured error types for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A handle was narrowed to a view its underlying value does not support
    #[error("Tag mismatch: expected {expected}, got {actual}")]
    TagMismatch {
        expected: &'static str,
        actual: ValueKind,
    },

    /// The engine returned no value; its exception channel carries the cause
    #[error("Native engine error: {operation} returned null")]
    NullPointer { operation: String },

    /// A handle from one engine was passed to another
    #[error("Engine mismatch: {operation} received a value from another engine")]
    EngineMismatch { operation: String },

    /// A property name crossing the boundary could not be reconstructed
    #[error("Invalid property name: {0}")]
    InvalidName(String),

    /// A configured limit was reached
    #[error("Resource limit: {0}")]
    ResourceLimit(String),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Internal/unexpected error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Create a tag mismatch error
    pub fn tag_mismatch(expected: &'static str, actual: ValueKind) -> Self {
        Self::TagMismatch { expected, actual }
    }

    /// Create a null pointer error
    pub fn null_pointer(operation: impl Into<String>) -> Self {
        Self::NullPointer {
            operation: operation.into(),
        }
    }

    /// Create an engine mismatch error
    pub fn engine_mismatch(operation: impl Into<String>) -> Self {
        Self::EngineMismatch {
            operation: operation.into(),
        }
    }

    /// Create an invalid name error
    pub fn invalid_name(message: impl Into<String>) -> Self {
        Self::InvalidName(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error type name
    pub fn error_type(&self) -> &str {
        match self {
            Self::TagMismatch { .. } => "TagMismatch",
            Self::NullPointer { .. } => "NativeError",
            Self::EngineMismatch { .. } => "EngineMismatch",
            Self::InvalidName(_) => "InvalidName",
            Self::ResourceLimit(_) => "ResourceLimitError",
            Self::Config(_) => "ConfigError",
            Self::Internal(_) => "InternalError",
        }
    }
}
