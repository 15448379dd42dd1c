use std::any::Any;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::ApiError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request id carried in request extensions for span fields and handlers.
#[derive(Debug, Clone)]
pub struct RequestId(pub HeaderValue);

fn generate_request_id() -> HeaderValue {
    HeaderValue::try_from(Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

/// Preserves an incoming `x-request-id` or generates one, and echoes it on
/// the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let req_id_value = req
        .headers()
        .get(&X_REQUEST_ID)
        .cloned()
        .unwrap_or_else(generate_request_id);

    req.extensions_mut().insert(RequestId(req_id_value.clone()));

    let mut res = next.run(req).await;
    res.headers_mut().insert(X_REQUEST_ID, req_id_value);
    res
}

/// Turns a handler panic into the generic 500 body.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::to_bytes, http::StatusCode, routing::get};
    use serde_json::Value;
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(request_id))
    }

    #[tokio::test]
    async fn test_generates_request_id() {
        let res = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = res.headers()[&X_REQUEST_ID].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_preserves_incoming_request_id() {
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.headers()[&X_REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn test_panic_becomes_generic_500() {
        async fn boom() -> &'static str {
            panic!("db handle poisoned")
        }

        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(axum::middleware::from_fn(request_id));

        let res = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.headers().contains_key(&X_REQUEST_ID));

        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "An unexpected error occurred");
    }
}
