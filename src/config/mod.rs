use serde::Deserialize;
use std::time::Duration;

use crate::services::worker::WorkerSettings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker process.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the job store, queue index and claims
    pub redis_url: String,

    /// Prefix for every Redis key this service owns
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// PostgreSQL connection string (ownership records)
    pub database_url: String,

    /// HS256 secret used to verify client bearer tokens
    pub jwt_secret: String,

    /// Shared secret expected in the `x-worker-secret` header of batch triggers
    pub worker_secret: String,

    /// Rendering service endpoint
    pub renderer_url: String,

    /// Rendering service API token
    pub renderer_token: String,

    #[serde(default = "default_renderer_timeout_secs")]
    pub renderer_timeout_secs: u64,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// Public base URL generated artifacts are served from
    pub asset_base_url: String,

    /// Most jobs drained per batch invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Claim visibility timeout in seconds
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retention of job records after their last update
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Interval between batches fired by the worker binary
    #[serde(default = "default_batch_interval_secs")]
    pub batch_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_key_prefix() -> String {
    "collectible_queue".to_string()
}

fn default_renderer_timeout_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    5
}

fn default_lease_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_job_ttl_secs() -> u64 {
    86_400
}

fn default_batch_interval_secs() -> u64 {
    60
}

/// Longest accepted job retention (ten years).
const MAX_JOB_TTL_SECS: u64 = 10 * 365 * 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or break the worker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("BATCH_SIZE must be at least 1".into()));
        }
        if self.lease_secs == 0 {
            return Err(ConfigError::Invalid("LEASE_SECS must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.job_ttl_secs == 0 || self.job_ttl_secs > MAX_JOB_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "JOB_TTL_SECS must be between 1 and {MAX_JOB_TTL_SECS}"
            )));
        }
        Ok(())
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            batch_size: self.batch_size,
            lease: Duration::from_secs(self.lease_secs),
            max_attempts: self.max_attempts,
        }
    }

    pub fn job_ttl(&self) -> chrono::Duration {
        i64::try_from(self.job_ttl_secs.min(MAX_JOB_TTL_SECS))
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(MAX_JOB_TTL_SECS as i64))
    }
}
