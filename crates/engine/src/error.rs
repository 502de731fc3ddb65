//! Error types for the BarkBase workflow engine.
//!
//! Per-execution and per-job failures must never take the worker loop
//! down; callers match on the variant to decide between skip, retry,
//! and terminal failure.

use thiserror::Error;

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Execution, definition, or step spec missing
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A step's side-effecting action failed
    #[error("Action error: {0}")]
    Action(String),

    /// Invalid workflow spec or request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Action(err.to_string())
    }
}

impl EngineError {
    /// Whether this error means the referenced row is gone and the
    /// message should be skipped rather than retried.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = EngineError::NotFound("execution 42".to_string());
        assert_eq!(err.to_string(), "Resource not found: execution 42");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_action_error() {
        let err = EngineError::Action("notify endpoint returned 502".to_string());
        assert_eq!(err.to_string(), "Action error: notify endpoint returned 502");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_validation_error() {
        let err = EngineError::Validation("entry step missing".to_string());
        assert_eq!(err.to_string(), "Validation error: entry step missing");
    }
}
