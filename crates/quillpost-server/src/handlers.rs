use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quillpost_core::{PageRequest, Post, PostId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use time::OffsetDateTime;

use crate::cache::list_posts_key;
use crate::error::ApiError;
use crate::pipeline::{CallContext, Endpoint, Reply, caller};
use crate::server::AppState;

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Raw pagination query values. Unparseable numbers fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

impl ListParams {
    fn resolve(&self, default_per_page: u32, max_per_page: u32) -> PageRequest {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok());
        PageRequest::resolve(
            parse(&self.page),
            parse(&self.per_page),
            default_per_page,
            max_per_page,
        )
    }
}

#[derive(Debug, Serialize)]
struct PostView<'a> {
    id: PostId,
    title: &'a str,
    body: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

impl<'a> From<&'a Post> for PostView<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            id: post.id,
            title: &post.title,
            body: &post.body,
            timestamp: post.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct PostListView<'a> {
    posts: Vec<PostView<'a>>,
    total: u64,
    pages: u64,
    current_page: u32,
    per_page: u32,
}

/// Decodes a JSON object body. Anything that is not a JSON object is
/// rejected with "Invalid JSON data".
fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ApiError::invalid_json())?;
    if !value.is_object() {
        return Err(ApiError::invalid_json());
    }
    serde_json::from_value(value).map_err(|_| ApiError::invalid_json())
}

fn parse_post_id(raw: &str) -> Result<PostId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound("Not Found".into()))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ready"})))
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub async fn signup(State(state): State<AppState>, ctx: CallContext, body: Bytes) -> Response {
    let pipeline = state.pipeline.clone();
    pipeline
        .execute(Endpoint::Signup, ctx, |_| async move {
            let req: CredentialsRequest = decode_json(&body)?;
            state
                .credentials
                .register(req.email.as_deref(), req.password.as_deref())
                .await?;
            Reply::json(
                StatusCode::CREATED,
                &json!({"message": "User created successfully"}),
            )
        })
        .await
}

pub async fn login(State(state): State<AppState>, ctx: CallContext, body: Bytes) -> Response {
    let pipeline = state.pipeline.clone();
    pipeline
        .execute(Endpoint::Login, ctx, |_| async move {
            let req: CredentialsRequest = decode_json(&body)?;
            let token = state
                .credentials
                .authenticate(req.email.as_deref(), req.password.as_deref())
                .await?;
            Reply::json(
                StatusCode::OK,
                &json!({"access_token": token.access_token}),
            )
        })
        .await
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

pub async fn create_post(
    State(state): State<AppState>,
    ctx: CallContext,
    body: Bytes,
) -> Response {
    let pipeline = state.pipeline.clone();
    pipeline
        .execute(Endpoint::CreatePost, ctx, |identity| async move {
            let identity = caller(identity)?;
            let req: PostRequest = decode_json(&body)?;
            let post = state
                .posts
                .create(identity.account_id, req.title.as_deref(), req.body.as_deref())
                .await?;
            Reply::json(
                StatusCode::CREATED,
                &json!({"message": "Post created successfully", "id": post.id}),
            )
        })
        .await
}

pub async fn list_posts(
    State(state): State<AppState>,
    ctx: CallContext,
    Query(params): Query<ListParams>,
) -> Response {
    let page = params.resolve(
        state.pagination.default_per_page,
        state.pagination.max_per_page,
    );
    let pipeline = state.pipeline.clone();
    pipeline
        .execute_cached(
            Endpoint::ListPosts,
            ctx,
            |identity| identity.map(|i| list_posts_key(i.account_id, page)),
            |identity| async move {
                let identity = caller(identity)?;
                let result = state.posts.list_owned(identity.account_id, page).await?;
                let view = PostListView {
                    posts: result.items.iter().map(PostView::from).collect(),
                    total: result.total,
                    pages: result.pages(),
                    current_page: result.page,
                    per_page: result.per_page,
                };
                Reply::json(StatusCode::OK, &view)
            },
        )
        .await
}

pub async fn get_post(
    State(state): State<AppState>,
    ctx: CallContext,
    Path(raw_id): Path<String>,
) -> Response {
    let id = match parse_post_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let pipeline = state.pipeline.clone();
    pipeline
        .execute(Endpoint::GetPost, ctx, |identity| async move {
            let identity = caller(identity)?;
            let post = state.posts.get_owned(id, identity.account_id).await?;
            Reply::json(StatusCode::OK, &PostView::from(&post))
        })
        .await
}

pub async fn update_post(
    State(state): State<AppState>,
    ctx: CallContext,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Response {
    let id = match parse_post_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let pipeline = state.pipeline.clone();
    pipeline
        .execute(Endpoint::UpdatePost, ctx, |identity| async move {
            let identity = caller(identity)?;
            let req: PostRequest = decode_json(&body)?;
            state
                .posts
                .update(
                    id,
                    identity.account_id,
                    req.title.as_deref(),
                    req.body.as_deref(),
                )
                .await?;
            Reply::json(
                StatusCode::OK,
                &json!({"message": "Post updated successfully"}),
            )
        })
        .await
}

pub async fn delete_post(
    State(state): State<AppState>,
    ctx: CallContext,
    Path(raw_id): Path<String>,
) -> Response {
    let id = match parse_post_id(&raw_id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let pipeline = state.pipeline.clone();
    pipeline
        .execute(Endpoint::DeletePost, ctx, |identity| async move {
            let identity = caller(identity)?;
            state.posts.delete(id, identity.account_id).await?;
            Reply::json(
                StatusCode::OK,
                &json!({"message": "Post deleted successfully"}),
            )
        })
        .await
}
