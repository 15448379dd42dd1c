use thiserror::Error;

use crate::validation::ValidationErrors;

/// Core error types for Quillpost operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

impl CoreError {
    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Returns `true` if this error came from field validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
