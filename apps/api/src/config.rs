use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::cache::CacheKeys;
use crate::service::DisclosurePolicy;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub rust_log: String,
    pub redis_key_rbac_permission: String,
    pub redis_key_rbac_role: String,
    pub max_page_size: u64,
    pub cache_timeout: Duration,
    /// Report out-of-scope records as Forbidden instead of NotFound.
    pub disclose_scope: bool,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let max_page_size: u64 = parse_env("MAX_PAGE_SIZE", "1000")?;
        ensure!(max_page_size >= 1, "MAX_PAGE_SIZE must be at least 1");

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            port: parse_env("PORT", "8080")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            redis_key_rbac_permission: std::env::var("REDIS_KEY_RBAC_PERMISSION")
                .unwrap_or_else(|_| "rbac:permission:".to_string()),
            redis_key_rbac_role: std::env::var("REDIS_KEY_RBAC_ROLE")
                .unwrap_or_else(|_| "rbac:role:".to_string()),
            max_page_size,
            cache_timeout: Duration::from_millis(parse_env("CACHE_TIMEOUT_MS", "250")?),
            disclose_scope: parse_env("RBAC_DISCLOSE_SCOPE", "false")?,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", "10")?,
        })
    }

    pub fn cache_keys(&self) -> CacheKeys {
        CacheKeys {
            permission_prefix: self.redis_key_rbac_permission.clone(),
            role_prefix: self.redis_key_rbac_role.clone(),
        }
    }

    pub fn disclosure(&self) -> DisclosurePolicy {
        DisclosurePolicy::from_flag(self.disclose_scope)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .with_context(|| format!("{key} is not valid"))
}
