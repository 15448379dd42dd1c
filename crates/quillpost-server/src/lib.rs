//! HTTP server for the Quillpost content API.
//!
//! Requests flow through [`pipeline::Pipeline`], which applies per-client
//! rate limits, bearer token verification and response caching in a fixed
//! order before handing off to the account and post services.

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod posts;
pub mod rate_limit;
pub mod server;

pub use config::AppConfig;
pub use error::ApiError;
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, QuillpostServer, ServerBuilder, build_app};
