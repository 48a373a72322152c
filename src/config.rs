//! Configuration (§6/§6.1): the shape HOCON would describe, parsed here
//! as JSON via `serde` — HOCON parsing itself is out of scope (§1).
//!
//! Grounded on the teacher's `Config`/`DatabaseConfig` pattern: plain
//! `#[derive(Deserialize)]` structs plus a `validate()` pass that turns
//! semantically-bad-but-syntactically-fine input (an unknown region)
//! into a `LoaderError::Configuration` before the daemon starts.

use crate::error::{LoaderError, Result};
use crate::model::StorageFolder;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// AWS regions this loader has been validated against. Not exhaustive —
/// narrow on purpose, matching the teacher's allow-list style for
/// environment validation rather than accepting any string.
const KNOWN_REGIONS: &[&str] = &[
    "us-east-1", "us-east-2", "us-west-1", "us-west-2", "eu-west-1", "eu-central-1", "ap-southeast-1", "ap-southeast-2",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderConfig {
    pub region: String,
    #[serde(default)]
    pub jsonpaths: Option<StorageFolder>,
    pub message_queue: String,
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedules: SchedulesConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub retry_queue: Option<RetryQueueConfig>,
    #[serde(default)]
    pub retries: RetriesConfig,
    #[serde(default)]
    pub ready_check: ReadyCheckOptions,
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub feature_flags: FeatureFlagsConfig,
}

impl LoaderConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let config: LoaderConfig = serde_json::from_str(raw).map_err(|e| LoaderError::configuration(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that can't be expressed as a `Deserialize` shape: does the
    /// region exist, is the storage dialect internally consistent.
    pub fn validate(&self) -> Result<()> {
        if !KNOWN_REGIONS.contains(&self.region.as_str()) {
            return Err(LoaderError::configuration(format!("unknown region: {}", self.region)));
        }
        if self.message_queue.trim().is_empty() {
            return Err(LoaderError::configuration("messageQueue must not be empty"));
        }
        self.storage.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StorageConfig {
    #[serde(rename_all = "camelCase")]
    Redshift { db_schema: String, #[serde(default)] use_transit_table: bool },
    #[serde(rename_all = "camelCase")]
    Snowflake { db_schema: String, warehouse: String },
    #[serde(rename_all = "camelCase")]
    Databricks { db_schema: String, catalog: String },
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        let schema = match self {
            StorageConfig::Redshift { db_schema, .. } => db_schema,
            StorageConfig::Snowflake { db_schema, .. } => db_schema,
            StorageConfig::Databricks { db_schema, .. } => db_schema,
        };
        if schema.trim().is_empty() {
            return Err(LoaderError::configuration("storage.dbSchema must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulesConfig {
    #[serde(default)]
    pub no_operation: Vec<NoOpScheduleEntry>,
}

/// A raw `schedules.noOperation` entry. `when` is kept as the cron text
/// unparsed — resolving it into concrete `[start, end)` instants for
/// [`crate::dispatch::NoOpWindow`] is a startup-time step outside this
/// struct, since cron evaluation has no precedent in the teacher or the
/// retrieval pack.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoOpScheduleEntry {
    pub name: String,
    pub when: String,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default)]
    pub snowplow: Option<SnowplowTrackerConfig>,
    #[serde(default)]
    pub sentry: Option<SentryConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub folders: Option<FolderMonitorSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnowplowTrackerConfig {
    pub collector: String,
    pub app_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentryConfig {
    pub dsn: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    #[serde(default)]
    pub statsd: Option<StatsdConfig>,
    #[serde(default)]
    pub stdout: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsdConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderMonitorSettings {
    pub period_seconds: u64,
    pub staging: StorageFolder,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    pub shredder_output: StorageFolder,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryQueueConfig {
    pub period_seconds: u64,
    pub size: usize,
    pub interval_seconds: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum RetriesConfig {
    Jitter {
        #[serde(default)]
        attempts: Option<u32>,
        backoff_seconds: u64,
        #[serde(default)]
        cumulative_bound_seconds: Option<u64>,
    },
    Fibonacci {
        #[serde(default)]
        attempts: Option<u32>,
        backoff_seconds: u64,
        #[serde(default)]
        cumulative_bound_seconds: Option<u64>,
    },
    Constant {
        #[serde(default)]
        attempts: Option<u32>,
        backoff_seconds: u64,
        #[serde(default)]
        cumulative_bound_seconds: Option<u64>,
    },
}

impl Default for RetriesConfig {
    fn default() -> Self {
        RetriesConfig::Jitter { attempts: Some(3), backoff_seconds: 1, cumulative_bound_seconds: None }
    }
}

impl RetriesConfig {
    /// Every strategy converges on the same bounded-exponential-with-jitter
    /// controller (§4.4) — `fibonacci`/`constant` are accepted for config
    /// compatibility but render to the same [`crate::retry::RetryConfig`]
    /// shape, differing only in the initial backoff seed.
    pub fn to_retry_config(&self) -> crate::retry::RetryConfig {
        let (attempts, backoff, bound) = match self {
            RetriesConfig::Jitter { attempts, backoff_seconds, cumulative_bound_seconds } => (attempts, backoff_seconds, cumulative_bound_seconds),
            RetriesConfig::Fibonacci { attempts, backoff_seconds, cumulative_bound_seconds } => (attempts, backoff_seconds, cumulative_bound_seconds),
            RetriesConfig::Constant { attempts, backoff_seconds, cumulative_bound_seconds } => (attempts, backoff_seconds, cumulative_bound_seconds),
        };
        crate::retry::RetryConfig {
            max_attempts: attempts.unwrap_or(3),
            initial_backoff: Duration::from_secs(*backoff),
            max_backoff: Duration::from_secs((*backoff).max(1) * 30),
            cumulative_bound: bound.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyCheckOptions {
    #[serde(default = "default_ready_check_attempts")]
    pub attempts: u32,
    #[serde(default = "default_ready_check_backoff_seconds")]
    pub backoff_seconds: u64,
}

fn default_ready_check_attempts() -> u32 {
    30
}

fn default_ready_check_backoff_seconds() -> u64 {
    1
}

impl Default for ReadyCheckOptions {
    fn default() -> Self {
        ReadyCheckOptions { attempts: default_ready_check_attempts(), backoff_seconds: default_ready_check_backoff_seconds() }
    }
}

impl ReadyCheckOptions {
    pub fn to_ready_check_config(&self) -> crate::load_state_machine::ReadyCheckConfig {
        crate::load_state_machine::ReadyCheckConfig {
            interval: Duration::from_secs(self.backoff_seconds),
            timeout: Duration::from_secs(self.backoff_seconds * self.attempts as u64),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    pub loading_seconds: u64,
    pub non_loading_seconds: u64,
    pub sqs_visibility_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagsConfig {
    #[serde(default)]
    pub add_load_tstamp_column: bool,
}
