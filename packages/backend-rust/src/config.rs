use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vocab_srs::{AlgorithmKind, UnknownAlgorithm};

use crate::db::config::{env_bool, env_i64, env_u64, DbConfig, DbConfigError};
use crate::services::study::{ReviewSettings, DEFAULT_QUEUE_LIMIT, MAX_QUEUE_LIMIT};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Daily-rotated log files are written here when set.
    pub log_dir: Option<PathBuf>,
    pub database: DbConfig,
    pub algorithm: AlgorithmKind,
    pub review: ReviewSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Database(#[from] DbConfigError),
    #[error("SRS_ALGORITHM: {0}")]
    Algorithm(#[from] UnknownAlgorithm),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = get("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = get("HOST")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = get("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let log_dir = env_bool(get, "ENABLE_FILE_LOGS", false).then(|| {
            PathBuf::from(get("LOG_DIR").unwrap_or_else(|| "./logs".to_string()))
        });

        let algorithm = match get("SRS_ALGORITHM") {
            Some(value) if !value.trim().is_empty() => value.parse::<AlgorithmKind>()?,
            _ => AlgorithmKind::default(),
        };

        let queue_max_limit = env_i64(get, "STUDY_QUEUE_MAX_LIMIT", MAX_QUEUE_LIMIT).max(1);
        let queue_default_limit = env_i64(get, "STUDY_QUEUE_DEFAULT_LIMIT", DEFAULT_QUEUE_LIMIT)
            .clamp(1, queue_max_limit);

        let review = ReviewSettings {
            deadline: Duration::from_millis(env_u64(get, "REVIEW_DEADLINE_MS", 10_000).max(1)),
            queue_default_limit,
            queue_max_limit,
        };

        Ok(Self {
            host,
            port,
            log_level,
            log_dir,
            database: DbConfig::from_lookup(get)?,
            algorithm,
            review,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
