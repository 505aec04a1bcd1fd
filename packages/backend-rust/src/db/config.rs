use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    Postgres,
    Sqlite,
}

impl DbBackend {
    pub fn detect(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DbBackend::Postgres => "postgres",
            DbBackend::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub backend: DbBackend,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Postgres `lock_timeout` and SQLite `busy_timeout`.
    pub lock_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, DbConfigError> {
        let url = get("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(DbConfigError::Missing {
                key: "DATABASE_URL",
            })?;

        Self::for_url(url).map(|config| Self {
            max_connections: env_u32(get, "DB_MAX_CONNECTIONS", 10).max(1),
            acquire_timeout: Duration::from_millis(env_u64(get, "DB_ACQUIRE_TIMEOUT_MS", 5000)),
            lock_timeout: Duration::from_millis(env_u64(get, "DB_LOCK_TIMEOUT_MS", 5000)),
            run_migrations: env_bool(get, "DB_RUN_MIGRATIONS", true),
            ..config
        })
    }

    /// Defaults for a given URL.
    pub fn for_url(url: impl Into<String>) -> Result<Self, DbConfigError> {
        let url = url.into();
        let backend =
            DbBackend::detect(&url).ok_or_else(|| DbConfigError::UnsupportedUrl(redact(&url)))?;

        Ok(Self {
            url,
            backend,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(5),
            run_migrations: true,
        })
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("Missing required env var: {key}")]
    Missing { key: &'static str },
    #[error("Unsupported DATABASE_URL (expected postgres:// or sqlite:): {0}")]
    UnsupportedUrl(String),
}

/// Keeps only the scheme so credentials never reach the logs.
fn redact(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, _)) => format!("{scheme}://…"),
        None => url.chars().take(16).collect(),
    }
}

pub(crate) fn env_bool(get: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match get(key).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

pub(crate) fn env_u64(get: &dyn Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    get(key)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u32(get: &dyn Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    get(key)
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_i64(get: &dyn Fn(&str) -> Option<String>, key: &str, default: i64) -> i64 {
    get(key)
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(default)
}
