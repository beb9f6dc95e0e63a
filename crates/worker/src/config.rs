use std::time::Duration;

use erpsync_core::entity::EntityType;
use erpsync_core::signature::WebhookAuthMode;
use erpsync_db::DEFAULT_MAX_CONNECTIONS;
use erpsync_sync::settings::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_PARALLEL, DEFAULT_STORE_TIMEOUT,
};
use erpsync_sync::{JobSettings, WebhookSettings};

/// Default scheduler period: 6 hours.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Default retention for resolved failed records.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Base URL of the external accounting API.
    pub api_url: String,
    pub api_token: Option<String>,
    /// Period of the scheduled `run_all`.
    pub sync_interval: Duration,
    /// Entity types each scheduled batch runs, in order.
    pub entities: Vec<EntityType>,
    /// Resolved failed records older than this are purged after each batch.
    pub failed_record_retention: chrono::Duration,
    pub job: JobSettings,
    pub webhook: WebhookSettings,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default          |
    /// |--------------------------------|------------------|
    /// | `DATABASE_URL`                 | required         |
    /// | `DATABASE_MAX_CONNECTIONS`     | `20`             |
    /// | `ACCOUNTING_API_URL`           | required         |
    /// | `ACCOUNTING_API_TOKEN`         | none             |
    /// | `WEBHOOK_SECRET`               | none             |
    /// | `WEBHOOK_AUTH_MODE`            | `shared_secret`  |
    /// | `SYNC_INTERVAL_SECS`           | `21600`          |
    /// | `SYNC_CALL_TIMEOUT_SECS`       | `30`             |
    /// | `SYNC_STORE_TIMEOUT_SECS`      | `10`             |
    /// | `SYNC_MAX_PARALLEL`            | `10`             |
    /// | `SYNC_ENTITIES`                | all              |
    /// | `FAILED_RECORD_RETENTION_DAYS` | `30`             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's
    /// value or `None` when it is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let api_url =
            var("ACCOUNTING_API_URL").ok_or(ConfigError::Missing("ACCOUNTING_API_URL"))?;
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "ACCOUNTING_API_URL",
                value: api_url,
                reason: "must start with http:// or https://".to_string(),
            });
        }

        let max_connections = positive(
            "DATABASE_MAX_CONNECTIONS",
            var("DATABASE_MAX_CONNECTIONS"),
            u64::from(DEFAULT_MAX_CONNECTIONS),
        )?;
        let max_connections = u32::try_from(max_connections).map_err(|e| ConfigError::Invalid {
            var: "DATABASE_MAX_CONNECTIONS",
            value: max_connections.to_string(),
            reason: e.to_string(),
        })?;

        let sync_interval = Duration::from_secs(positive(
            "SYNC_INTERVAL_SECS",
            var("SYNC_INTERVAL_SECS"),
            DEFAULT_SYNC_INTERVAL_SECS,
        )?);

        let job = JobSettings {
            call_timeout: Duration::from_secs(positive(
                "SYNC_CALL_TIMEOUT_SECS",
                var("SYNC_CALL_TIMEOUT_SECS"),
                DEFAULT_CALL_TIMEOUT.as_secs(),
            )?),
            store_timeout: Duration::from_secs(positive(
                "SYNC_STORE_TIMEOUT_SECS",
                var("SYNC_STORE_TIMEOUT_SECS"),
                DEFAULT_STORE_TIMEOUT.as_secs(),
            )?),
            max_parallel: usize::try_from(positive(
                "SYNC_MAX_PARALLEL",
                var("SYNC_MAX_PARALLEL"),
                DEFAULT_MAX_PARALLEL as u64,
            )?)
            .unwrap_or(usize::MAX),
        };

        let entities = match var("SYNC_ENTITIES") {
            Some(raw) => EntityType::parse_selection(&raw).map_err(|e| ConfigError::Invalid {
                var: "SYNC_ENTITIES",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => EntityType::ALL.to_vec(),
        };

        let retention_days = positive(
            "FAILED_RECORD_RETENTION_DAYS",
            var("FAILED_RECORD_RETENTION_DAYS"),
            DEFAULT_RETENTION_DAYS as u64,
        )?;

        let auth_mode = match var("WEBHOOK_AUTH_MODE") {
            Some(raw) => WebhookAuthMode::parse(&raw).map_err(|e| ConfigError::Invalid {
                var: "WEBHOOK_AUTH_MODE",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => WebhookAuthMode::default(),
        };
        let webhook = WebhookSettings {
            auth_mode,
            secret: var("WEBHOOK_SECRET"),
            ..WebhookSettings::default()
        };

        Ok(Self {
            database_url,
            max_connections,
            api_url,
            api_token: var("ACCOUNTING_API_TOKEN"),
            sync_interval,
            entities,
            failed_record_retention: chrono::Duration::days(retention_days as i64),
            job,
            webhook,
        })
    }
}

/// Parse an optional positive integer, falling back to `default`.
fn positive(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
