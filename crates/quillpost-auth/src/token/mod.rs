//! Access token issuing and verification.

pub mod jwt;
pub mod verifier;

pub use jwt::{AccessTokenClaims, IssuedToken, JwtError, JwtService};
pub use verifier::{Identity, TokenVerifier, VerifyError, bearer_token};
