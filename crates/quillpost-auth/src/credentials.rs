//! Account registration and login.

use std::sync::Arc;

use quillpost_core::{Account, NewAccount, ValidationErrors};
use quillpost_storage::AccountStorage;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::config::{AuthConfig, ConfigError};
use crate::error::AuthError;
use crate::password::{hash_password_blocking, verify_password_blocking};
use crate::token::{IssuedToken, JwtService};

const MISSING_FIELDS: &str = "Email and password are required";
const INVALID_EMAIL: &str = "Invalid email format";
const USER_EXISTS: &str = "User already exists";

/// Registers accounts and exchanges credentials for access tokens.
#[derive(Clone)]
pub struct CredentialService {
    accounts: Arc<dyn AccountStorage>,
    jwt: Arc<JwtService>,
    username_pattern: Regex,
    password_min_length: usize,
}

impl CredentialService {
    /// Creates a service from validated auth settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the username pattern does not
    /// compile.
    pub fn new(
        accounts: Arc<dyn AccountStorage>,
        jwt: Arc<JwtService>,
        config: &AuthConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            accounts,
            jwt,
            username_pattern: config.username_regex()?,
            password_min_length: config.password_min_length,
        })
    }

    /// Checks presence and shape of the submitted credentials.
    ///
    /// Returns the pair when both are present and the username matches the
    /// configured pattern.
    fn validate_credentials<'a>(
        &self,
        username: Option<&'a str>,
        password: Option<&'a str>,
    ) -> Result<(&'a str, &'a str), ValidationErrors> {
        let mut errors = ValidationErrors::new(MISSING_FIELDS);
        let username = errors.require("email", username);
        let password = errors.require("password", password);
        let (Some(username), Some(password)) = (username, password) else {
            return Err(errors);
        };

        if !self.username_pattern.is_match(username) {
            return Err(ValidationErrors::single(
                INVALID_EMAIL,
                "email",
                "must be a valid email address",
            ));
        }

        Ok((username, password))
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// - `Invalid` for a missing field, a malformed username or a short
    ///   password
    /// - `Conflict` if the username is taken
    /// - `Storage`/`Internal` for backend failures
    #[instrument(skip_all, fields(username = username.unwrap_or_default()))]
    pub async fn register(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Account, AuthError> {
        let (username, password) = self.validate_credentials(username, password).inspect_err(|e| {
            warn!(reason = %e.summary, "Signup rejected");
        })?;

        if password.chars().count() < self.password_min_length {
            let message = format!(
                "Password must be at least {} characters long",
                self.password_min_length
            );
            warn!(reason = %message, "Signup rejected");
            return Err(ValidationErrors::single(message.clone(), "password", message).into());
        }

        let secret_hash = hash_password_blocking(password.to_string()).await?;
        let account = self
            .accounts
            .create(NewAccount::new(username, secret_hash))
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    warn!("Signup rejected: username taken");
                    AuthError::conflict(USER_EXISTS)
                } else {
                    AuthError::from(e)
                }
            })?;

        info!(account_id = %account.id, "Account created");
        Ok(account)
    }

    /// Verifies credentials and issues an access token.
    ///
    /// Unknown usernames and wrong passwords both yield
    /// `AuthError::InvalidCredentials` after the same amount of hashing work.
    ///
    /// # Errors
    ///
    /// - `Invalid` for a missing field or a malformed username
    /// - `InvalidCredentials` when the pair does not match an account
    /// - `Storage`/`Internal` for backend failures
    #[instrument(skip_all, fields(username = username.unwrap_or_default()))]
    pub async fn authenticate(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<IssuedToken, AuthError> {
        let (username, password) = self.validate_credentials(username, password).inspect_err(|e| {
            warn!(reason = %e.summary, "Login rejected");
        })?;

        let account = self.accounts.find_by_username(username).await?;
        let stored_hash = account.as_ref().map(|a| a.secret_hash.clone());
        let matches = verify_password_blocking(password.to_string(), stored_hash).await?;

        let Some(account) = account.filter(|_| matches) else {
            warn!("Login rejected: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        };

        let issued = self
            .jwt
            .issue_access_token(account.id)
            .map_err(|e| AuthError::internal(e.to_string()))?;

        info!(account_id = %account.id, "Access token issued");
        Ok(issued)
    }
}
