//! Error taxonomy for the loader daemon.
//!
//! One flat enum covers every kind named in the error-handling design:
//! configuration failures are fatal at startup, discovery/migration
//! failures are alerted and acknowledged, transient DB failures are
//! retried by [`crate::retry`], fatal DB failures terminate the stream.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LoaderError {
    /// Malformed config file, unknown region, invalid target driver. Fatal
    /// on startup (exit code 2).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Registry resolution failed or the queue message could not be
    /// parsed. The message has already been received, so a nack is not
    /// possible: the caller alerts and acks anyway.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// The migration planner could not compute a delta: stale catalog
    /// version, or a single-entry schema list on a target that needs a
    /// migration.
    #[error("migration error: {0}")]
    Migration(String),

    /// Connection reset, pool exhaustion, warehouse busy, single-attempt
    /// timeout. Retried per the bounded backoff policy.
    #[error("transient database error: {0}")]
    TransientDb(String),

    /// DDL syntax, permission, constraint violation. Alerted, acked, and
    /// the stream is terminated so the supervisor restarts the process.
    #[error("fatal database error: {0}")]
    FatalDb(String),

    /// Uncaught exception surfaced from the dispatch loop.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl LoaderError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        LoaderError::Configuration(msg.into())
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        LoaderError::Discovery(msg.into())
    }

    pub fn migration(msg: impl Into<String>) -> Self {
        LoaderError::Migration(msg.into())
    }

    pub fn transient_db(msg: impl Into<String>) -> Self {
        LoaderError::TransientDb(msg.into())
    }

    pub fn fatal_db(msg: impl Into<String>) -> Self {
        LoaderError::FatalDb(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        LoaderError::Runtime(msg.into())
    }

    /// A statement or operation this target dialect does not implement
    /// (e.g. Snowflake `GetVersion`, Databricks `TableExists`).
    pub fn not_supported(msg: impl Into<String>) -> Self {
        LoaderError::Migration(format!("not supported: {}", msg.into()))
    }

    /// Whether the retry controller should retry this error rather than
    /// abort the attempt immediately. See §4.4 of the migration planner
    /// design: only transient DB failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, LoaderError::TransientDb(_))
    }

    /// Whether this error means the process should terminate its stream
    /// after alerting (fatal DB errors and unrecovered runtime errors).
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoaderError::FatalDb(_) | LoaderError::Runtime(_))
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(e: serde_json::Error) -> Self {
        LoaderError::Discovery(format!("malformed JSON: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
