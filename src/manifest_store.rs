//! The manifest (C2): the idempotence record for loaded batches.
//!
//! `initialize`/`get` each open their own connection through the
//! [`Transactor`]; `add` does not — it must run inside the caller's
//! already-open transaction, so it takes the connection and target
//! directly, the same shape the load state machine already holds them
//! in while building a batch's transaction body.

use crate::error::Result;
use crate::model::{ManifestEntry, ShreddingComplete, StorageFolder};
use crate::statement::Statement;
use crate::target::Target;
use crate::transactor::{Connection, Transactor};
use std::sync::Arc;

/// A row's worth of `ManifestGet` is carried back as a single JSON
/// string per row — the real JDBC row-to-struct mapping is out of scope
/// (see [`crate::transactor::Connection`]); this is the seam a
/// production driver fills in.
pub struct ManifestStore {
    transactor: Arc<Transactor>,
}

impl ManifestStore {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        ManifestStore { transactor }
    }

    /// Idempotent: creates the manifest table if it does not exist yet.
    pub async fn initialize(&self) -> Result<()> {
        self.transactor
            .run(|conn, target| {
                Box::pin(async move {
                    let sql = target.to_fragment(&target.get_manifest())?;
                    conn.execute(&sql).await
                })
            })
            .await
    }

    /// `None` means `base` has never been loaded — the sole idempotence
    /// check the load state machine relies on. Opens its own connection;
    /// use [`ManifestStore::get_within`] to check inside an open
    /// transaction (the `ManifestCheck` stage).
    pub async fn get(&self, base: &StorageFolder) -> Result<Option<ManifestEntry>> {
        let base = base.clone();
        self.transactor
            .run(move |conn, target| Box::pin(async move { ManifestStore::get_within(conn, target, &base).await }))
            .await
    }

    /// Same lookup as `get`, against a connection the caller already
    /// holds — the `ManifestCheck` stage must observe the transaction's
    /// own view, not a fresh pooled connection.
    pub async fn get_within(conn: &dyn Connection, target: &dyn Target, base: &StorageFolder) -> Result<Option<ManifestEntry>> {
        let sql = target.to_fragment(&Statement::ManifestGet { base: base.clone() })?;
        let rows = conn.query_rows(&sql).await?;
        let row = rows.into_iter().next().and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) });
        match row {
            Some(json) => Ok(Some(serde_json::from_str::<ManifestEntry>(&json)?)),
            None => Ok(None),
        }
    }

    /// Insert the manifest row for a just-loaded batch. Must be called
    /// with the connection that holds the batch's open transaction.
    pub async fn add(conn: &dyn Connection, target: &dyn Target, message: ShreddingComplete) -> Result<()> {
        let sql = target.to_fragment(&Statement::ManifestAdd { message })?;
        conn.execute(&sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::FakeColumnDiffer;
    use crate::model::{BatchTimestamps, Compression, ProcessorInfo, ShreddedTypeInfo};
    use crate::target::RedshiftTarget;
    use crate::transactor::fake::{FakeConnection, FakeConnectionFactory};

    fn store_with(conn: Arc<FakeConnection>) -> ManifestStore {
        let factory = Arc::new(FakeConnectionFactory::new(conn));
        let differ = Arc::new(FakeColumnDiffer::new());
        let target: Arc<dyn Target> = Arc::new(RedshiftTarget::new("atomic", differ, false));
        ManifestStore::new(Arc::new(Transactor::new(factory, target)))
    }

    #[tokio::test]
    async fn initialize_runs_create_table_outside_a_transaction() {
        let conn = Arc::new(FakeConnection::default());
        let store = store_with(conn.clone());
        store.initialize().await.unwrap();
        let executed = conn.executed.lock().clone();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("manifest"));
    }

    #[tokio::test]
    async fn get_returns_none_when_no_row() {
        let conn = Arc::new(FakeConnection::default());
        conn.row_responses.lock().push_back(Vec::new());
        let store = store_with(conn);
        let base = StorageFolder::parse("s3://bucket/run=1/").unwrap();
        assert!(store.get(&base).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_deserializes_the_recorded_entry() {
        let conn = Arc::new(FakeConnection::default());
        let base = StorageFolder::parse("s3://bucket/run=1/").unwrap();
        let entry = ManifestEntry {
            base: base.clone(),
            types: serde_json::json!([]),
            shredding_started: chrono::Utc::now(),
            shredding_completed: chrono::Utc::now(),
            min_collector: None,
            max_collector: None,
            ingestion: chrono::Utc::now(),
            compression: Compression::Gzip,
            processor: ProcessorInfo { artifact: "rdb-shredder".to_string(), version: "5.0.0".to_string() },
            count_good: Some(10),
        };
        conn.row_responses.lock().push_back(vec![vec![serde_json::to_string(&entry).unwrap()]]);
        let store = store_with(conn);
        let fetched = store.get(&base).await.unwrap().unwrap();
        assert_eq!(fetched.base, base);
        assert_eq!(fetched.count_good, Some(10));
    }

    #[tokio::test]
    async fn add_executes_on_the_given_connection_without_its_own_transaction() {
        let conn = FakeConnection::default();
        let differ = Arc::new(FakeColumnDiffer::new());
        let target = RedshiftTarget::new("atomic", differ, false);
        let message = ShreddingComplete {
            base: StorageFolder::parse("s3://bucket/run=1/").unwrap(),
            types: vec![ShreddedTypeInfo {
                vendor: "com.acme".to_string(),
                name: "context".to_string(),
                model: 1,
                format: crate::model::ShredFormat::Json,
                snowplow_entity: crate::model::SnowplowEntity::Context,
            }],
            timestamps: BatchTimestamps { job_started: chrono::Utc::now(), job_completed: chrono::Utc::now(), min_collector: None, max_collector: None },
            compression: Compression::Gzip,
            processor: ProcessorInfo { artifact: "rdb-shredder".to_string(), version: "5.0.0".to_string() },
            count: Some(1),
        };

        ManifestStore::add(&conn, &target, message).await.unwrap();
        let executed = conn.executed.lock().clone();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("INSERT INTO"));
    }
}
