use std::{net::SocketAddr, time::Duration};

use quillpost_auth::AuthConfig;
use quillpost_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

use crate::rate_limit::Quota;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Token signing and credential rules
    #[serde(default)]
    pub auth: AuthConfig,
    /// Per-class request quotas
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Response cache for the post listing
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Storage validations
        if self.storage.backend == StorageBackend::Postgres {
            self.storage
                .postgres
                .validate()
                .map_err(|e| format!("storage.postgres: {e}"))?;
        }
        // Auth validations
        self.auth.validate().map_err(|e| format!("auth: {e}"))?;
        // Rate limit validations
        for (name, quota) in self.rate_limit.named_quotas() {
            if let Some(quota) = quota {
                if quota.requests == 0 {
                    return Err(format!("rate_limit.{name}.requests must be > 0"));
                }
                if quota.window.is_zero() {
                    return Err(format!("rate_limit.{name}.window must be > 0"));
                }
            }
        }
        // Cache validations
        if self.cache.max_entries == 0 {
            return Err("cache.max_entries must be > 0".into());
        }
        // Pagination validations
        if self.pagination.default_per_page == 0 {
            return Err("pagination.default_per_page must be > 0".into());
        }
        if self.pagination.default_per_page > self.pagination.max_per_page {
            return Err("pagination.default_per_page must be <= pagination.max_per_page".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::new(host, self.server.port)
    }
}

// =============================================================================
// Server
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps; data is lost on restart.
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

// =============================================================================
// Rate limiting
// =============================================================================

/// Quotas per operation class. A class set to `None` is unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_signup_quota")]
    pub signup: Option<Quota>,
    #[serde(default = "default_login_quota")]
    pub login: Option<Quota>,
    #[serde(default = "default_mutate_post_quota")]
    pub mutate_post: Option<Quota>,
    #[serde(default = "default_read_post_quota")]
    pub read_post: Option<Quota>,
    #[serde(default)]
    pub list_posts: Option<Quota>,
    /// Once this many (client, class) windows are tracked, expired windows
    /// are purged before a new one is added.
    #[serde(default = "default_max_tracked_keys")]
    pub max_tracked_keys: usize,
}

fn default_signup_quota() -> Option<Quota> {
    Some(Quota::per_minute(10))
}
fn default_login_quota() -> Option<Quota> {
    Some(Quota::per_minute(10))
}
fn default_mutate_post_quota() -> Option<Quota> {
    Some(Quota::per_minute(5))
}
fn default_read_post_quota() -> Option<Quota> {
    Some(Quota::per_minute(20))
}
fn default_max_tracked_keys() -> usize {
    10_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            signup: default_signup_quota(),
            login: default_login_quota(),
            mutate_post: default_mutate_post_quota(),
            read_post: default_read_post_quota(),
            list_posts: None,
            max_tracked_keys: default_max_tracked_keys(),
        }
    }
}

impl RateLimitConfig {
    fn named_quotas(&self) -> [(&'static str, Option<Quota>); 5] {
        [
            ("signup", self.signup),
            ("login", self.login),
            ("mutate_post", self.mutate_post),
            ("read_post", self.read_post),
            ("list_posts", self.list_posts),
        ]
    }
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a cached listing is served before it is recomputed
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Maximum number of cached responses
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_cache_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

// =============================================================================
// Pagination
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

fn default_per_page() -> u32 {
    10
}
fn default_max_per_page() -> u32 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_PATH: &str = "quillpost.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., QUILLPOST__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("QUILLPOST")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }
}
