//! Authentication configuration.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default pattern an account username must match.
pub const DEFAULT_USERNAME_PATTERN: &str = r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$";

/// Authentication configuration.
///
/// Controls the token signing secret and lifetime as well as the rules a
/// new account's credentials must satisfy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify access tokens.
    pub jwt_secret: String,

    /// Value of the `iss` claim; tokens from another issuer are rejected.
    pub issuer: String,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Minimum number of characters in a password at signup.
    pub password_min_length: usize,

    /// Regular expression a username must match.
    pub username_pattern: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "quillpost".to_string(),
            access_token_lifetime: Duration::from_secs(15 * 60),
            password_min_length: 8,
            username_pattern: DEFAULT_USERNAME_PATTERN.to_string(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the signing secret is empty and
    /// `ConfigError::InvalidValue` if:
    /// - The issuer is empty
    /// - The token lifetime is zero
    /// - The minimum password length is zero
    /// - The username pattern is not a valid regular expression
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("auth.jwt_secret".to_string()));
        }

        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.password_min_length == 0 {
            return Err(ConfigError::InvalidValue(
                "password_min_length must be > 0".to_string(),
            ));
        }

        self.username_regex()?;

        Ok(())
    }

    /// Compiles the username pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the pattern does not compile.
    pub fn username_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.username_pattern).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "Invalid username_pattern '{}': {e}",
                self.username_pattern
            ))
        })
    }
}
