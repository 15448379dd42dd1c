//! # quillpost-auth
//!
//! Credentials and access tokens for Quillpost.
//!
//! - [`CredentialService`] registers accounts (Argon2id password hashes) and
//!   exchanges a username/password pair for a signed access token.
//! - [`TokenVerifier`] validates a presented bearer token and returns the
//!   caller's [`Identity`] without touching the account store.

pub mod config;
pub mod credentials;
pub mod error;
pub mod password;
pub mod token;

pub use config::{AuthConfig, ConfigError};
pub use credentials::CredentialService;
pub use error::AuthError;
pub use token::{Identity, IssuedToken, JwtService, TokenVerifier, VerifyError, bearer_token};

/// Result type alias for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;
