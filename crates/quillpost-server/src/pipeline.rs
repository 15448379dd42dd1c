//! The ordered request pipeline.
//!
//! Every API call runs the same stages in the same order:
//!
//! 1. rate limit check for the caller's client key and the endpoint's class
//! 2. bearer token verification on protected endpoints
//! 3. cache lookup on cacheable endpoints
//! 4. the operation itself (which decodes its own request body)
//! 5. cache population after a successful cacheable operation
//! 6. the response, with rate limit headers attached
//!
//! The rate limit check runs before anything else, so even a would-be cache
//! hit or a malformed body consumes quota.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use quillpost_auth::{Identity, TokenVerifier, bearer_token};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CachedResponse, ResponseCache};
use crate::error::ApiError;
use crate::rate_limit::{RateClass, RateDecision, RateLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// API operations routed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Signup,
    Login,
    CreatePost,
    ListPosts,
    GetPost,
    UpdatePost,
    DeletePost,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::CreatePost => "create_post",
            Self::ListPosts => "list_posts",
            Self::GetPost => "get_post",
            Self::UpdatePost => "update_post",
            Self::DeletePost => "delete_post",
        }
    }

    pub fn rate_class(&self) -> RateClass {
        match self {
            Self::Signup => RateClass::Signup,
            Self::Login => RateClass::Login,
            Self::CreatePost | Self::UpdatePost | Self::DeletePost => RateClass::MutatePost,
            Self::GetPost => RateClass::ReadPost,
            Self::ListPosts => RateClass::ListPosts,
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, Self::Signup | Self::Login)
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::ListPosts)
    }
}

/// Per-call inputs the pipeline needs before the operation runs.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Peer IP address, or `"unknown"` when the server was started without
    /// connection info.
    pub client_key: String,
    pub bearer: Option<String>,
}

impl<S> FromRequestParts<S> for CallContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let client_key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_owned);

        Ok(Self { client_key, bearer })
    }
}

/// A successful operation result: status plus a serialized JSON body.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Reply {
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ApiError::Internal(format!("Failed to serialize response: {e}")))?;
        Ok(Self {
            status,
            body: Bytes::from(body),
        })
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        json_response(self.status, self.body)
    }
}

fn json_response(status: StatusCode, body: Bytes) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    verifier: TokenVerifier,
}

impl Pipeline {
    pub fn new(limiter: Arc<RateLimiter>, cache: Arc<ResponseCache>, verifier: TokenVerifier) -> Self {
        Self {
            limiter,
            cache,
            verifier,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Runs a non-cached operation.
    pub async fn execute<F, Fut>(&self, endpoint: Endpoint, ctx: CallContext, op: F) -> Response
    where
        F: FnOnce(Option<Identity>) -> Fut,
        Fut: Future<Output = Result<Reply, ApiError>>,
    {
        self.execute_cached(endpoint, ctx, |_| None, op).await
    }

    /// Runs an operation whose successful result may be served from cache.
    ///
    /// `cache_key` receives the verified identity and returns the key, or
    /// `None` to bypass the cache for this call.
    pub async fn execute_cached<K, F, Fut>(
        &self,
        endpoint: Endpoint,
        ctx: CallContext,
        cache_key: K,
        op: F,
    ) -> Response
    where
        K: FnOnce(Option<&Identity>) -> Option<String>,
        F: FnOnce(Option<Identity>) -> Fut,
        Fut: Future<Output = Result<Reply, ApiError>>,
    {
        let decision = self.limiter.allow(&ctx.client_key, endpoint.rate_class());
        let mut response = self.process(endpoint, &ctx, decision, cache_key, op).await;
        apply_rate_headers(response.headers_mut(), &decision);
        response
    }

    async fn process<K, F, Fut>(
        &self,
        endpoint: Endpoint,
        ctx: &CallContext,
        decision: RateDecision,
        cache_key: K,
        op: F,
    ) -> Response
    where
        K: FnOnce(Option<&Identity>) -> Option<String>,
        F: FnOnce(Option<Identity>) -> Fut,
        Fut: Future<Output = Result<Reply, ApiError>>,
    {
        if let RateDecision::Denied { quota, .. } = decision {
            warn!(
                endpoint = endpoint.name(),
                client = %ctx.client_key,
                "Rate limit exceeded"
            );
            return ApiError::RateLimited(quota).into_response();
        }

        let identity = if endpoint.requires_auth() {
            match self.verifier.verify(ctx.bearer.as_deref()) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!(endpoint = endpoint.name(), reason = %e, "Authentication failed");
                    return ApiError::from(e).into_response();
                }
            }
        } else {
            None
        };

        let key = if endpoint.is_cacheable() {
            cache_key(identity.as_ref())
        } else {
            None
        };

        if let Some(key) = &key
            && let Some(hit) = self.cache.get(key)
        {
            debug!(endpoint = endpoint.name(), key = %key, "Cache hit");
            let mut response = json_response(hit.status, hit.body.clone());
            response
                .headers_mut()
                .insert(X_CACHE, HeaderValue::from_static("HIT"));
            return response;
        }

        match op(identity).await {
            Ok(reply) => {
                if let Some(key) = key
                    && reply.status.is_success()
                {
                    self.cache.put(
                        key,
                        CachedResponse {
                            status: reply.status,
                            body: reply.body.clone(),
                        },
                        self.cache.ttl(),
                    );
                    let mut response = reply.into_response();
                    response
                        .headers_mut()
                        .insert(X_CACHE, HeaderValue::from_static("MISS"));
                    return response;
                }
                reply.into_response()
            }
            Err(err) => {
                debug!(endpoint = endpoint.name(), error = %err, "Operation failed");
                err.into_response()
            }
        }
    }
}

/// Returns the identity for a protected endpoint.
///
/// The pipeline always verifies protected endpoints first, so `None` only
/// reaches here if an operation is wired to the wrong endpoint.
pub fn caller(identity: Option<Identity>) -> Result<Identity, ApiError> {
    identity.ok_or_else(|| ApiError::Unauthorized("Missing authorization token".into()))
}

fn header_value(n: impl ToString) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

fn apply_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    match *decision {
        RateDecision::Unlimited => {}
        RateDecision::Allowed {
            limit,
            remaining,
            reset,
        } => {
            headers.insert(X_RATELIMIT_LIMIT, header_value(limit));
            headers.insert(X_RATELIMIT_REMAINING, header_value(remaining));
            headers.insert(X_RATELIMIT_RESET, header_value(reset.unix_timestamp()));
        }
        RateDecision::Denied {
            quota,
            reset,
            retry_after,
        } => {
            let retry_secs = (retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)).max(1);
            headers.insert(X_RATELIMIT_LIMIT, header_value(quota.requests));
            headers.insert(X_RATELIMIT_REMAINING, header_value(0));
            headers.insert(X_RATELIMIT_RESET, header_value(reset.unix_timestamp()));
            headers.insert(RETRY_AFTER, header_value(retry_secs));
        }
    }
}
