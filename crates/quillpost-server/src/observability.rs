// Tracing initialization with a reloadable log level.
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // RUST_LOG wins over the configured level when set.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Applies a new log level at runtime. Returns false when tracing was not
/// initialized through [`init_tracing_with_level`].
pub fn apply_logging_level(level: &str) -> bool {
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return false;
    };
    handle
        .modify(|f| {
            *f = EnvFilter::new(level);
        })
        .is_ok()
}

pub fn shutdown_tracing() {
    tracing::info!("Shutting down");
}
