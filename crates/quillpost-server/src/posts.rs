//! Owner-scoped post operations.
//!
//! A post that does not exist and a post owned by someone else produce the
//! same `Forbidden` outcome, so callers cannot probe for other accounts'
//! post ids.

use std::sync::Arc;

use quillpost_core::{AccountId, NewPost, Page, PageRequest, Post, PostId, ValidationErrors};
use quillpost_storage::{PostStorage, StorageError};
use tracing::{info, warn};

const FIELDS_REQUIRED: &str = "Title and body are required";

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("User not authorized to access this post")]
    Forbidden,

    #[error(transparent)]
    Invalid(#[from] ValidationErrors),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Checks that title and body are both present and non-blank.
fn validate_fields<'a>(
    title: Option<&'a str>,
    body: Option<&'a str>,
) -> Result<(&'a str, &'a str), ValidationErrors> {
    let mut errors = ValidationErrors::new(FIELDS_REQUIRED);
    let title = errors.require("title", title);
    let body = errors.require("body", body);
    match (title, body) {
        (Some(title), Some(body)) => Ok((title, body)),
        _ => Err(errors),
    }
}

#[derive(Clone)]
pub struct PostRepository {
    posts: Arc<dyn PostStorage>,
}

impl PostRepository {
    pub fn new(posts: Arc<dyn PostStorage>) -> Self {
        Self { posts }
    }

    pub async fn create(
        &self,
        owner: AccountId,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<Post, PostError> {
        let (title, body) = validate_fields(title, body).inspect_err(|_| {
            warn!(%owner, "Title and body are required");
        })?;

        let post = self.posts.create(NewPost::new(owner, title, body)).await?;
        info!(post_id = %post.id, %owner, "Post created");
        Ok(post)
    }

    pub async fn get_owned(&self, id: PostId, owner: AccountId) -> Result<Post, PostError> {
        self.posts.find_owned(id, owner).await?.ok_or_else(|| {
            warn!(post_id = %id, %owner, "User not authorized to access this post");
            PostError::Forbidden
        })
    }

    /// Replaces title and body.
    ///
    /// Ownership is checked before the fields are validated, so a caller
    /// sending an empty body for someone else's post sees `Forbidden`.
    pub async fn update(
        &self,
        id: PostId,
        owner: AccountId,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<Post, PostError> {
        self.get_owned(id, owner).await?;

        let (title, body) = validate_fields(title, body).inspect_err(|_| {
            warn!(post_id = %id, %owner, "Title and body are required");
        })?;

        // The post may have been deleted since the ownership check.
        let post = self
            .posts
            .update_owned(id, owner, title, body)
            .await?
            .ok_or(PostError::Forbidden)?;
        info!(post_id = %id, "Post updated");
        Ok(post)
    }

    pub async fn delete(&self, id: PostId, owner: AccountId) -> Result<(), PostError> {
        if !self.posts.delete_owned(id, owner).await? {
            warn!(post_id = %id, %owner, "User not authorized to access this post");
            return Err(PostError::Forbidden);
        }
        info!(post_id = %id, "Post deleted");
        Ok(())
    }

    pub async fn list_owned(
        &self,
        owner: AccountId,
        page: PageRequest,
    ) -> Result<Page<Post>, PostError> {
        let page = self.posts.list_owned(owner, page).await?;
        info!(%owner, count = page.items.len(), total = page.total, "Posts retrieved");
        Ok(page)
    }
}
