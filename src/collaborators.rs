//! Interfaces for everything the purpose statement treats as an
//! external collaborator: the Iglu schema registry, the object-storage
//! client, and the message-queue client. None of these are implemented
//! against real infrastructure here — only the trait the core consumes,
//! plus an in-memory fake used by tests, following the teacher's
//! convention of pairing a trait with a `Mock*` implementation
//! (`networking::traits`).

use crate::error::{LoaderError, Result};
use crate::model::{SchemaKey, SchemaList, StorageFolder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A pure `lookup(vendor, name, model) -> schema-version-list` client
/// against an Iglu schema registry.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn get_schemas(&self, vendor: &str, name: &str, model: u32) -> Result<SchemaList>;
}

/// The subset of an object-storage client (S3-shaped) the core needs:
/// listing prefixes under a root, for the folder monitor.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List immediate batch prefixes under `root` with a last-modified
    /// time at or after `since`.
    async fn list_prefixes(&self, root: &StorageFolder, since: DateTime<Utc>) -> Result<Vec<StorageFolder>>;
}

/// One received queue message: an opaque payload plus the ack/extend
/// callbacks the dispatch loop needs. Implementations wrap the real
/// SQS/Pub/Sub message; this trait only exposes what the core uses.
#[async_trait]
pub trait QueueMessage: Send + Sync {
    fn body(&self) -> &str;
    async fn ack(&self) -> Result<()>;
    async fn extend(&self, visibility: std::time::Duration) -> Result<()>;
}

/// The message-queue client: receive, and the per-message ack/extend
/// callbacks above.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn receive(&self) -> Result<Option<Box<dyn QueueMessage>>>;
}

/// An in-memory [`SchemaRegistry`] used by tests: a fixed vendor/name/model
/// -> `SchemaList` table.
#[derive(Default)]
pub struct FakeRegistry {
    schemas: Mutex<HashMap<(String, String, u32), SchemaList>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        FakeRegistry::default()
    }

    pub async fn register(&self, vendor: &str, name: &str, model: u32, list: SchemaList) {
        self.schemas.lock().await.insert((vendor.to_string(), name.to_string(), model), list);
    }
}

#[async_trait]
impl SchemaRegistry for FakeRegistry {
    async fn get_schemas(&self, vendor: &str, name: &str, model: u32) -> Result<SchemaList> {
        self.schemas
            .lock()
            .await
            .get(&(vendor.to_string(), name.to_string(), model))
            .cloned()
            .ok_or_else(|| LoaderError::discovery(format!("no schemas registered for {vendor}/{name}/{model}")))
    }
}

/// One column-level change between two schema versions in the same
/// migration chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnChange {
    /// A new, nullable column — always safe to apply inside a
    /// transaction.
    Add { name: String, sql_type: String },
    /// An existing column's type must widen (e.g. `VARCHAR(32)` ->
    /// `VARCHAR(64)`) — most warehouses refuse this inside a
    /// transaction.
    Widen { name: String, sql_type: String },
}

/// Diffs two schema versions into column-level changes. This is the
/// schema-content counterpart to [`SchemaRegistry`]: the registry
/// resolves *which* versions exist, this resolves *what changed*
/// between two of them. Both are pure lookups against data the core
/// does not own (the Iglu schema bodies), so both are modeled as
/// injected collaborators rather than logic living in the planner.
pub trait ColumnDiffer: Send + Sync {
    fn diff(&self, current: &SchemaKey, target: &SchemaKey) -> Result<Vec<ColumnChange>>;
}

/// An in-memory [`ColumnDiffer`] used by tests: a fixed
/// `(current, target) -> changes` table.
#[derive(Default)]
pub struct FakeColumnDiffer {
    diffs: std::sync::Mutex<HashMap<(SchemaKey, SchemaKey), Vec<ColumnChange>>>,
}

impl FakeColumnDiffer {
    pub fn new() -> Self {
        FakeColumnDiffer::default()
    }

    pub fn register(&self, current: SchemaKey, target: SchemaKey, changes: Vec<ColumnChange>) {
        self.diffs.lock().unwrap().insert((current, target), changes);
    }
}

impl ColumnDiffer for FakeColumnDiffer {
    fn diff(&self, current: &SchemaKey, target: &SchemaKey) -> Result<Vec<ColumnChange>> {
        self.diffs
            .lock()
            .unwrap()
            .get(&(current.clone(), target.clone()))
            .cloned()
            .ok_or_else(|| LoaderError::migration(format!("no column diff registered for {current} -> {target}")))
    }
}

/// A fake queue message that records whether it was acked, for test
/// assertions.
pub struct FakeMessage {
    pub body: String,
    pub acked: Arc<Mutex<bool>>,
    pub extend_calls: Arc<Mutex<u32>>,
}

#[async_trait]
impl QueueMessage for FakeMessage {
    fn body(&self) -> &str {
        &self.body
    }

    async fn ack(&self) -> Result<()> {
        *self.acked.lock().await = true;
        Ok(())
    }

    async fn extend(&self, _visibility: std::time::Duration) -> Result<()> {
        *self.extend_calls.lock().await += 1;
        Ok(())
    }
}

/// An in-memory [`ObjectStore`] used by tests: a fixed table of
/// `(folder, last_modified)` pairs, filtered by prefix and `since`.
#[derive(Default)]
pub struct FakeObjectStore {
    entries: std::sync::Mutex<Vec<(StorageFolder, DateTime<Utc>)>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        FakeObjectStore::default()
    }

    pub fn add(&self, folder: StorageFolder, last_modified: DateTime<Utc>) {
        self.entries.lock().unwrap().push((folder, last_modified));
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn list_prefixes(&self, root: &StorageFolder, since: DateTime<Utc>) -> Result<Vec<StorageFolder>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(folder, modified)| folder.as_str().starts_with(root.as_str()) && *modified >= since)
            .map(|(folder, _)| folder.clone())
            .collect())
    }
}

/// An in-memory [`MessageQueue`] that replays a fixed list of bodies.
pub struct FakeQueue {
    pending: Mutex<Vec<String>>,
}

impl FakeQueue {
    pub fn new(bodies: Vec<String>) -> Self {
        FakeQueue { pending: Mutex::new(bodies) }
    }
}

#[async_trait]
impl MessageQueue for FakeQueue {
    async fn receive(&self) -> Result<Option<Box<dyn QueueMessage>>> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(None);
        }
        let body = pending.remove(0);
        Ok(Some(Box::new(FakeMessage {
            body,
            acked: Arc::new(Mutex::new(false)),
            extend_calls: Arc::new(Mutex::new(0)),
        })))
    }
}
