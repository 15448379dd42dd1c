use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use quillpost_auth::{ConfigError, CredentialService, JwtService, TokenVerifier};
use quillpost_db_memory::InMemoryStorage;
use quillpost_db_postgres::PostgresStorage;
use quillpost_storage::{AccountStorage, PostStorage};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer,
};

use crate::{
    cache::ResponseCache,
    config::{AppConfig, PaginationConfig, StorageBackend},
    handlers,
    middleware::{self as app_middleware, RequestId},
    pipeline::Pipeline,
    posts::PostRepository,
    rate_limit::RateLimiter,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialService,
    pub posts: PostRepository,
    pub pipeline: Pipeline,
    pub pagination: PaginationConfig,
}

impl AppState {
    /// Wires services over the given stores.
    pub fn new(
        cfg: &AppConfig,
        accounts: Arc<dyn AccountStorage>,
        posts: Arc<dyn PostStorage>,
    ) -> Result<Self, ConfigError> {
        cfg.auth.validate()?;

        let jwt = Arc::new(JwtService::from_secret(
            cfg.auth.jwt_secret.as_bytes(),
            cfg.auth.issuer.clone(),
            cfg.auth.access_token_lifetime,
        ));
        let credentials = CredentialService::new(accounts, jwt.clone(), &cfg.auth)?;
        let pipeline = Pipeline::new(
            Arc::new(RateLimiter::new(cfg.rate_limit.clone())),
            Arc::new(ResponseCache::new(&cfg.cache)),
            TokenVerifier::new(jwt),
        );

        Ok(Self {
            credentials,
            posts: PostRepository::new(posts),
            pipeline,
            pagination: cfg.pagination.clone(),
        })
    }

    /// Opens the configured storage backend and wires services over it.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let (accounts, posts): (Arc<dyn AccountStorage>, Arc<dyn PostStorage>) =
            match cfg.storage.backend {
                StorageBackend::Memory => {
                    tracing::info!("Using in-memory storage");
                    let storage = Arc::new(InMemoryStorage::new());
                    (storage.clone(), storage)
                }
                StorageBackend::Postgres => {
                    tracing::info!("Using PostgreSQL storage");
                    let storage = Arc::new(PostgresStorage::connect(&cfg.storage.postgres).await?);
                    (storage.clone(), storage)
                }
            };

        Ok(Self::new(cfg, accounts, posts)?)
    }
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/signup", post(handlers::signup))
        .route("/login", post(handlers::login))
        .route(
            "/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/posts/{id}",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .with_state(state)
        // Outermost first: request id -> trace -> cors -> compression -> body limit -> panic guard
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::request_id))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            use tracing::field::Empty;
                            let req_id = req
                                .extensions()
                                .get::<RequestId>()
                                .and_then(|id| id.0.to_str().ok())
                                .unwrap_or("")
                                .to_string();
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.target = %req.uri(),
                                http.status_code = Empty,
                                request_id = %req_id
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: std::time::Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(CatchPanicLayer::custom(app_middleware::handle_panic)),
        )
}

pub struct QuillpostServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<QuillpostServer> {
        let state = AppState::from_config(&self.config).await?;
        let app = build_app(state, &self.config);

        Ok(QuillpostServer {
            addr: self.addr,
            app,
        })
    }
}

impl QuillpostServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        // Peer addresses feed the per-client rate limiter.
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
