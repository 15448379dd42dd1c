//! Credential service error types.

use quillpost_core::ValidationErrors;
use quillpost_storage::StorageError;

/// Errors returned by the credential service.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// One or more request fields failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),

    /// The username is already registered.
    #[error("{message}")]
    Conflict {
        /// Client-facing message.
        message: String,
    },

    /// Unknown account or wrong password. The two are never distinguished.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// An error occurred while storing or retrieving account data.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by the caller's input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Invalid(_) | Self::Conflict { .. } | Self::InvalidCredentials
        )
    }
}
