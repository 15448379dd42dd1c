//! Access token verification.
//!
//! Verification is a pure function of the presented token, the signing
//! secret and the current time. It never touches the account store.

use std::sync::Arc;

use quillpost_core::AccountId;
use tracing::debug;

use super::jwt::{AccessTokenClaims, JwtError, JwtService};

/// The caller identity extracted from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: AccountId,
    /// `jti` of the token the identity came from.
    pub token_id: String,
}

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("Missing authorization token")]
    Missing,

    #[error("Invalid token")]
    Invalid,

    #[error("Token has expired")]
    Expired,
}

/// Validates bearer tokens issued by [`JwtService`].
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    jwt: Arc<JwtService>,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self { jwt }
    }

    /// Verifies an optional raw token.
    ///
    /// # Errors
    ///
    /// - `Missing` when no token was presented
    /// - `Expired` when the signature is good but `exp` has passed
    /// - `Invalid` for anything else, including a `sub` that is not an
    ///   account id
    pub fn verify(&self, token: Option<&str>) -> Result<Identity, VerifyError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(VerifyError::Missing)?;

        let data = self
            .jwt
            .decode::<AccessTokenClaims>(token)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                match e {
                    JwtError::Expired => VerifyError::Expired,
                    _ => VerifyError::Invalid,
                }
            })?;

        let account_id = data.claims.account_id().map_err(|e| {
            debug!(error = %e, "Token subject rejected");
            VerifyError::Invalid
        })?;

        Ok(Identity {
            account_id,
            token_id: data.claims.jti,
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::OffsetDateTime;

    use super::*;

    fn jwt() -> Arc<JwtService> {
        Arc::new(JwtService::from_secret(
            b"test-secret",
            "quillpost",
            Duration::from_secs(900),
        ))
    }

    #[test]
    fn test_round_trip_identity() {
        let jwt = jwt();
        let verifier = TokenVerifier::new(jwt.clone());
        let issued = jwt.issue_access_token(AccountId::new(42)).unwrap();

        let identity = verifier.verify(Some(&issued.access_token)).unwrap();
        assert_eq!(identity.account_id, AccountId::new(42));
        assert_eq!(identity.token_id, issued.token_id);
    }

    #[test]
    fn test_missing_token() {
        let verifier = TokenVerifier::new(jwt());
        assert_eq!(verifier.verify(None), Err(VerifyError::Missing));
        assert_eq!(verifier.verify(Some("  ")), Err(VerifyError::Missing));
    }

    #[test]
    fn test_invalid_token() {
        let verifier = TokenVerifier::new(jwt());
        assert_eq!(verifier.verify(Some("garbage")), Err(VerifyError::Invalid));
    }

    #[test]
    fn test_expired_token() {
        let jwt = jwt();
        let verifier = TokenVerifier::new(jwt.clone());
        let claims = AccessTokenClaims::new(
            AccountId::new(1),
            "quillpost",
            OffsetDateTime::now_utc() - time::Duration::minutes(20),
            Duration::from_secs(15 * 60),
        );
        let token = jwt.encode(&claims).unwrap();

        assert_eq!(verifier.verify(Some(&token)), Err(VerifyError::Expired));
    }

    #[test]
    fn test_non_numeric_subject_is_invalid() {
        let jwt = jwt();
        let verifier = TokenVerifier::new(jwt.clone());
        let claims = AccessTokenClaims {
            sub: "someone".to_string(),
            ..AccessTokenClaims::new(
                AccountId::new(1),
                "quillpost",
                OffsetDateTime::now_utc(),
                Duration::from_secs(60),
            )
        };
        let token = jwt.encode(&claims).unwrap();

        assert_eq!(verifier.verify(Some(&token)), Err(VerifyError::Invalid));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
