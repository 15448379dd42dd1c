//! JWT access token generation and validation.
//!
//! Tokens are signed with HS256 using a shared secret. Validation checks the
//! signature, the issuer and the expiry with zero leeway.
//!
//! ## Example
//!
//! ```ignore
//! use quillpost_auth::token::jwt::JwtService;
//!
//! let jwt = JwtService::from_secret(b"secret", "quillpost", Duration::from_secs(900));
//! let issued = jwt.issue_access_token(AccountId::new(1))?;
//! let data = jwt.decode::<AccessTokenClaims>(&issued.access_token)?;
//! ```

use std::fmt;
use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use quillpost_core::AccountId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Account id, as a decimal string.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

impl AccessTokenClaims {
    /// Builds claims for `account` valid from `now` for `lifetime`.
    #[must_use]
    pub fn new(account: AccountId, issuer: &str, now: OffsetDateTime, lifetime: Duration) -> Self {
        let iat = now.unix_timestamp();
        let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        Self {
            sub: account.to_string(),
            iss: issuer.to_string(),
            iat,
            exp: iat.saturating_add(lifetime),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Parses `sub` as an account id.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::InvalidClaims` if `sub` is not an integer.
    pub fn account_id(&self) -> Result<AccountId, JwtError> {
        self.sub
            .parse()
            .map_err(|_| JwtError::invalid_claims(format!("sub '{}' is not an account id", self.sub)))
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: OffsetDateTime,
    pub token_id: String,
}

// ============================================================================
// JWT Service
// ============================================================================

/// Signs and validates HS256 access tokens.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_lifetime: Duration,
}

impl fmt::Debug for JwtService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.issuer)
            .field("access_token_lifetime", &self.access_token_lifetime)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Creates a service from a shared HMAC secret.
    #[must_use]
    pub fn from_secret(
        secret: &[u8],
        issuer: impl Into<String>,
        access_token_lifetime: Duration,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            access_token_lifetime,
        }
    }

    /// Encodes claims into a signed JWT.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT.
    ///
    /// # Errors
    /// Returns an error if the signature, issuer or expiry check fails.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        decode(token, &self.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Issues an access token for `account` starting now.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue_access_token(&self, account: AccountId) -> Result<IssuedToken, JwtError> {
        let claims = AccessTokenClaims::new(
            account,
            &self.issuer,
            OffsetDateTime::now_utc(),
            self.access_token_lifetime,
        );
        let access_token = self.encode(&claims)?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|e| JwtError::encoding_error(e.to_string()))?;

        Ok(IssuedToken {
            access_token,
            expires_at,
            token_id: claims.jti,
        })
    }

    /// Returns the issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the access token lifetime.
    #[must_use]
    pub fn access_token_lifetime(&self) -> Duration {
        self.access_token_lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::from_secret(b"test-secret", "quillpost", Duration::from_secs(900))
    }

    #[test]
    fn test_issue_and_decode() {
        let jwt = service();
        let issued = jwt.issue_access_token(AccountId::new(7)).unwrap();

        let data = jwt.decode::<AccessTokenClaims>(&issued.access_token).unwrap();
        assert_eq!(data.claims.sub, "7");
        assert_eq!(data.claims.iss, "quillpost");
        assert_eq!(data.claims.exp - data.claims.iat, 900);
        assert_eq!(data.claims.jti, issued.token_id);
        assert_eq!(data.claims.account_id().unwrap(), AccountId::new(7));
    }

    #[test]
    fn test_tokens_are_unique() {
        let jwt = service();
        let a = jwt.issue_access_token(AccountId::new(1)).unwrap();
        let b = jwt.issue_access_token(AccountId::new(1)).unwrap();
        assert_ne!(a.access_token, b.access_token);
    }

    #[test]
    fn test_expired_token() {
        let jwt = service();
        let past = OffsetDateTime::now_utc() - time::Duration::hours(1);
        let claims = AccessTokenClaims::new(
            AccountId::new(1),
            "quillpost",
            past,
            Duration::from_secs(60),
        );
        let token = jwt.encode(&claims).unwrap();

        let err = jwt.decode::<AccessTokenClaims>(&token).unwrap_err();
        assert!(matches!(err, JwtError::Expired));
    }

    #[test]
    fn test_wrong_secret() {
        let issued = service().issue_access_token(AccountId::new(1)).unwrap();
        let other = JwtService::from_secret(b"other-secret", "quillpost", Duration::from_secs(900));

        let err = other
            .decode::<AccessTokenClaims>(&issued.access_token)
            .unwrap_err();
        assert!(matches!(err, JwtError::InvalidSignature));
    }

    #[test]
    fn test_wrong_issuer() {
        let issued = service().issue_access_token(AccountId::new(1)).unwrap();
        let other = JwtService::from_secret(b"test-secret", "elsewhere", Duration::from_secs(900));

        let err = other
            .decode::<AccessTokenClaims>(&issued.access_token)
            .unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaims { .. }));
    }

    #[test]
    fn test_garbage_token() {
        let err = service()
            .decode::<AccessTokenClaims>("not.a.token")
            .unwrap_err();
        assert!(matches!(err, JwtError::DecodingError { .. }));
    }

    #[test]
    fn test_non_numeric_subject() {
        let claims = AccessTokenClaims {
            sub: "alice".to_string(),
            ..AccessTokenClaims::new(
                AccountId::new(1),
                "quillpost",
                OffsetDateTime::now_utc(),
                Duration::from_secs(60),
            )
        };
        assert!(matches!(
            claims.account_id(),
            Err(JwtError::InvalidClaims { .. })
        ));
    }
}
