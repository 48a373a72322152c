//! The monitoring façade (C10): metrics, success/alert payloads, and
//! exception forwarding — a pure interface consumed by the load state
//! machine, dispatch loop, and folder monitor. Grounded on the
//! teacher's `monitoring::alerts` severity/category vocabulary, narrowed
//! to what this domain needs.

use crate::error::LoaderError;
use crate::model::StorageFolder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub severity: AlertSeverity,
    pub message: String,
    pub folder: Option<StorageFolder>,
    pub tags: HashMap<String, String>,
}

impl AlertPayload {
    pub fn info(message: impl Into<String>, folder: Option<StorageFolder>) -> Self {
        AlertPayload { severity: AlertSeverity::Info, message: message.into(), folder, tags: HashMap::new() }
    }

    pub fn warning(message: impl Into<String>, folder: Option<StorageFolder>) -> Self {
        AlertPayload { severity: AlertSeverity::Warning, message: message.into(), folder, tags: HashMap::new() }
    }

    pub fn error(message: impl Into<String>, folder: Option<StorageFolder>) -> Self {
        AlertPayload { severity: AlertSeverity::Error, message: message.into(), folder, tags: HashMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub app: String,
    pub base: StorageFolder,
    pub ingestion: DateTime<Utc>,
    pub started: DateTime<Utc>,
    pub attempts: u64,
    pub shredding_started: DateTime<Utc>,
    pub shredding_completed: DateTime<Utc>,
    pub metrics: Option<KvMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvMetrics {
    pub values: HashMap<String, f64>,
}

impl KvMetrics {
    pub fn new() -> Self {
        KvMetrics::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }
}

/// Pure outbound interface: success/alert payloads, metrics, and
/// exception forwarding. Real sinks (Snowplow tracker, Sentry, StatsD)
/// are pluggable implementations of this trait; out of scope per §1.
pub trait Monitoring: Send + Sync {
    fn success(&self, payload: SuccessPayload);
    fn alert(&self, payload: AlertPayload);
    fn track_exception(&self, error: &LoaderError);
    fn metrics(&self, metrics: KvMetrics);
}

/// The default/test double: structured log emission instead of a real
/// sink, matching the teacher's `tracing_subscriber` logging
/// conventions in `main.rs`.
#[derive(Default)]
pub struct StdoutMonitoring;

impl Monitoring for StdoutMonitoring {
    fn success(&self, payload: SuccessPayload) {
        info!(base = %payload.base, ingestion = %payload.ingestion, attempts = payload.attempts, "load succeeded");
    }

    fn alert(&self, payload: AlertPayload) {
        match payload.severity {
            AlertSeverity::Info => info!(message = %payload.message, folder = ?payload.folder, "alert"),
            AlertSeverity::Warning => warn!(message = %payload.message, folder = ?payload.folder, "alert"),
            AlertSeverity::Error => error!(message = %payload.message, folder = ?payload.folder, "alert"),
        }
    }

    fn track_exception(&self, error: &LoaderError) {
        error!(error = %error, "exception");
    }

    fn metrics(&self, metrics: KvMetrics) {
        for (k, v) in &metrics.values {
            info!(metric = k, value = v, "metric");
        }
    }
}

/// An in-memory [`Monitoring`] used by tests: records every payload it
/// receives.
#[derive(Default)]
pub struct RecordingMonitoring {
    pub successes: parking_lot::Mutex<Vec<SuccessPayload>>,
    pub alerts: parking_lot::Mutex<Vec<AlertPayload>>,
    pub exceptions: parking_lot::Mutex<Vec<LoaderError>>,
}

impl Monitoring for RecordingMonitoring {
    fn success(&self, payload: SuccessPayload) {
        self.successes.lock().push(payload);
    }

    fn alert(&self, payload: AlertPayload) {
        self.alerts.lock().push(payload);
    }

    fn track_exception(&self, error: &LoaderError) {
        self.exceptions.lock().push(error.clone());
    }

    fn metrics(&self, _metrics: KvMetrics) {}
}
