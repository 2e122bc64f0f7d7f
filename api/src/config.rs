//! Job runner configuration loaded via OrthoConfig.
//!
//! Values come from `PCAPI_*` environment variables (and any configuration
//! file OrthoConfig discovers). The database URL also falls back to the
//! conventional `DATABASE_URL`.

use std::env;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_EXPIRY_BATCH_SIZE: usize = 500;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable lines.
    Pretty,
}

/// Errors raised by [`PcapiSettings::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Neither `PCAPI_DATABASE_URL` nor `DATABASE_URL` is set.
    #[error("database URL is missing: set PCAPI_DATABASE_URL or DATABASE_URL")]
    MissingDatabaseUrl,
    /// A URL does not parse.
    #[error("{name} is not a valid URL: {message}")]
    InvalidUrl {
        /// Setting name.
        name: &'static str,
        /// Parser message.
        message: String,
    },
    /// Batch size must be positive.
    #[error("expiry batch size must be greater than zero")]
    InvalidBatchSize,
    /// Unknown log format.
    #[error("unknown log format {0:?}, expected \"json\" or \"pretty\"")]
    UnknownLogFormat(String),
}

/// Raw settings as loaded from the environment.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PCAPI")]
pub struct PcapiSettings {
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,
    /// Redis connection URL for reindexing signals and notifications.
    pub redis_url: Option<String>,
    /// Number of bookings cancelled per expiry transaction.
    pub expiry_batch_size: Option<usize>,
    /// `json` (default) or `pretty`.
    pub log_format: Option<String>,
    /// Whether the auto-use job may run.
    #[ortho_config(default = true)]
    pub update_booking_used: bool,
}

/// Settings checked and resolved against their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// Bookings per expiry batch.
    pub expiry_batch_size: usize,
    /// Log output format.
    pub log_format: LogFormat,
    /// Whether the auto-use job may run.
    pub update_booking_used: bool,
}

impl PcapiSettings {
    /// Resolve defaults and validate every value.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or missing setting.
    pub fn validate(&self) -> Result<JobSettings, ConfigError> {
        let database_url = self
            .database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()))
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        check_url("database URL", &database_url)?;

        let redis_url = self
            .redis_url
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_owned());
        check_url("redis URL", &redis_url)?;

        let expiry_batch_size = self.expiry_batch_size.unwrap_or(DEFAULT_EXPIRY_BATCH_SIZE);
        if expiry_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        let log_format = match self.log_format.as_deref().map(str::trim) {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(other) => return Err(ConfigError::UnknownLogFormat(other.to_owned())),
        };

        Ok(JobSettings {
            database_url,
            redis_url,
            expiry_batch_size,
            log_format,
            update_booking_used: self.update_booking_used,
        })
    }
}

fn check_url(name: &'static str, raw: &str) -> Result<(), ConfigError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|err| ConfigError::InvalidUrl {
            name,
            message: err.to_string(),
        })
}
