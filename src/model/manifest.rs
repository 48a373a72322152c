//! The manifest row: the idempotence record for one loaded batch.

use super::discovery::{Compression, ProcessorInfo};
use super::storage_path::StorageFolder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row per loaded `base`. Presence of a row is the sole proof that a
/// batch has been loaded; the row is written once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub base: StorageFolder,
    pub types: serde_json::Value,
    pub shredding_started: DateTime<Utc>,
    pub shredding_completed: DateTime<Utc>,
    pub min_collector: Option<DateTime<Utc>>,
    pub max_collector: Option<DateTime<Utc>>,
    pub ingestion: DateTime<Utc>,
    pub compression: Compression,
    pub processor: ProcessorInfo,
    pub count_good: Option<u64>,
}
