//! Storage traits implemented by every backend.

use async_trait::async_trait;
use quillpost_core::{Account, AccountId, NewAccount, NewPost, Page, PageRequest, Post, PostId};

use crate::StorageResult;

/// Persistence for accounts.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Inserts a new account and returns it with its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`](crate::StorageError::Conflict) if
    /// the username is already taken. The check and the insert are atomic.
    async fn create(&self, account: NewAccount) -> StorageResult<Account>;

    /// Finds an account by its exact username.
    async fn find_by_username(&self, username: &str) -> StorageResult<Option<Account>>;
}

/// Persistence for posts. All lookups are scoped by owner.
#[async_trait]
pub trait PostStorage: Send + Sync {
    /// Inserts a new post and returns it with its assigned identifier.
    async fn create(&self, post: NewPost) -> StorageResult<Post>;

    /// Returns the post only if it exists and belongs to `owner`.
    async fn find_owned(&self, id: PostId, owner: AccountId) -> StorageResult<Option<Post>>;

    /// Replaces title and body of a post owned by `owner`.
    ///
    /// Returns `None` (and changes nothing) if no such owned post exists.
    /// `created_at` and `owner_id` are never touched.
    async fn update_owned(
        &self,
        id: PostId,
        owner: AccountId,
        title: &str,
        body: &str,
    ) -> StorageResult<Option<Post>>;

    /// Permanently deletes a post owned by `owner`.
    ///
    /// Returns `false` if no such owned post exists.
    async fn delete_owned(&self, id: PostId, owner: AccountId) -> StorageResult<bool>;

    /// Lists posts owned by `owner` in ascending id order.
    async fn list_owned(&self, owner: AccountId, page: PageRequest) -> StorageResult<Page<Post>>;
}
