//! Account and post models.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::id::{AccountId, PostId};

// =============================================================================
// Account
// =============================================================================

/// A registered account.
///
/// Accounts are created by signup and never mutated afterwards. The
/// `secret_hash` is a PHC-formatted Argon2 string and is redacted from the
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub secret_hash: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("secret_hash", &"<redacted>")
            .finish()
    }
}

/// Account data before the store assigns an identifier.
#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub secret_hash: String,
}

impl NewAccount {
    pub fn new(username: impl Into<String>, secret_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret_hash: secret_hash.into(),
        }
    }

    /// Attaches the store-assigned identifier.
    pub fn into_account(self, id: AccountId) -> Account {
        Account {
            id,
            username: self.username,
            secret_hash: self.secret_hash,
        }
    }
}

// =============================================================================
// Post
// =============================================================================

/// A title/body content item owned by exactly one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub owner_id: AccountId,
    pub title: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Post data before the store assigns an identifier.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub owner_id: AccountId,
    pub title: String,
    pub body: String,
    pub created_at: OffsetDateTime,
}

impl NewPost {
    /// Creates a new post stamped with the current UTC time.
    ///
    /// Sub-second precision is dropped so the timestamp survives a round
    /// trip through any store unchanged.
    pub fn new(owner_id: AccountId, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            owner_id,
            title: title.into(),
            body: body.into(),
            created_at: now.replace_nanosecond(0).unwrap_or(now),
        }
    }

    /// Attaches the store-assigned identifier.
    pub fn into_post(self, id: PostId) -> Post {
        Post {
            id,
            owner_id: self.owner_id,
            title: self.title,
            body: self.body,
            created_at: self.created_at,
        }
    }
}
