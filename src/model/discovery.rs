//! The queue message payload (`ShreddingComplete`) and the
//! registry-resolved discovery it becomes (`DataDiscovery`).

use super::schema::SchemaList;
use super::storage_path::StorageFolder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compression {
    Gzip,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShredFormat {
    Tsv,
    Json,
    #[serde(rename = "WIDEROW")]
    WideRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnowplowEntity {
    SelfDescribing,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorInfo {
    pub artifact: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTimestamps {
    pub job_started: DateTime<Utc>,
    pub job_completed: DateTime<Utc>,
    pub min_collector: Option<DateTime<Utc>>,
    pub max_collector: Option<DateTime<Utc>>,
}

/// One `(vendor, name, model, format)` tuple appearing in a batch, as
/// described by the shredder before the registry has been consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShreddedTypeInfo {
    pub vendor: String,
    pub name: String,
    pub model: u32,
    pub format: ShredFormat,
    pub snowplow_entity: SnowplowEntity,
}

/// The queue message payload: a batch has finished shredding at `base`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShreddingComplete {
    pub base: StorageFolder,
    pub types: Vec<ShreddedTypeInfo>,
    pub timestamps: BatchTimestamps,
    pub compression: Compression,
    pub processor: ProcessorInfo,
    pub count: Option<u64>,
}

/// One shredded type after registry resolution: the raw `ShreddedTypeInfo`
/// plus the full migration chain (`SchemaList`) for non-atomic,
/// non-legacy-JSON types.
#[derive(Debug, Clone)]
pub struct ShreddedType {
    pub info: ShreddedTypeInfo,
    pub schema_list: Option<SchemaList>,
}

/// A `ShreddingComplete` message with every non-atomic type resolved
/// against the schema registry. This is what the load state machine and
/// migration planner actually consume.
#[derive(Debug, Clone)]
pub struct DataDiscovery {
    pub base: StorageFolder,
    pub compression: Compression,
    pub shredded_types: Vec<ShreddedType>,
    pub timestamps: BatchTimestamps,
    pub processor: ProcessorInfo,
    pub count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_shredding_complete() {
        let json = serde_json::json!({
            "base": "s3://bucket/run=1/",
            "types": [{
                "vendor": "com.acme",
                "name": "context",
                "model": 1,
                "format": "TSV",
                "snowplowEntity": "Context"
            }],
            "timestamps": {
                "jobStarted": "2021-01-01T00:00:00Z",
                "jobCompleted": "2021-01-01T00:05:00Z",
                "minCollector": null,
                "maxCollector": null
            },
            "compression": "GZIP",
            "processor": {"artifact": "rdb-shredder", "version": "5.0.0"},
            "count": 42
        });
        let msg: ShreddingComplete = serde_json::from_value(json).unwrap();
        assert_eq!(msg.types.len(), 1);
        assert_eq!(msg.count, Some(42));
    }
}
