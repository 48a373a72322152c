//! The per-batch load state machine (C6): ready-check, migration
//! planning, the transactional copy, and the manifest commit, wrapped by
//! the retry controller from `ManifestCheck` onward.
//!
//! Pre-transaction migrations are deliberately outside the retry
//! boundary — some widen a column type irreversibly, and replaying them
//! on a retried attempt would be unsound (§4.6).

use crate::collaborators::SchemaRegistry;
use crate::control::ControlSurface;
use crate::error::{LoaderError, Result};
use crate::manifest_store::ManifestStore;
use crate::migration_planner;
use crate::model::{DataDiscovery, Migration, ShredFormat, ShreddedType, ShreddingComplete, Stage};
use crate::retry::RetryController;
use crate::statement::Statement;
use crate::transactor::Transactor;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { ingestion: DateTime<Utc> },
    AlreadyLoaded,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadyCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadyCheckConfig {
    fn default() -> Self {
        ReadyCheckConfig { interval: Duration::from_secs(1), timeout: Duration::from_secs(30) }
    }
}

enum AttemptOutcome {
    Loaded,
    AlreadyLoaded,
}

pub struct LoadStateMachine {
    transactor: Arc<Transactor>,
    manifest: Arc<ManifestStore>,
    registry: Arc<dyn SchemaRegistry>,
    retry: RetryController,
    ready_check: ReadyCheckConfig,
}

impl LoadStateMachine {
    pub fn new(transactor: Arc<Transactor>, manifest: Arc<ManifestStore>, registry: Arc<dyn SchemaRegistry>, retry: RetryController, ready_check: ReadyCheckConfig) -> Self {
        LoadStateMachine { transactor, manifest, registry, retry, ready_check }
    }

    pub async fn run(&self, control: Arc<ControlSurface>, message: ShreddingComplete, shutdown: watch::Receiver<bool>) -> Result<LoadOutcome> {
        self.wait_ready().await?;

        control.set_stage(Stage::MigrationBuild);
        let discovery = resolve_discovery(&message, self.registry.as_ref()).await?;
        let migration = migration_planner::plan(&self.transactor, &discovery).await?;

        control.set_stage(Stage::MigrationPre);
        for action in &migration.pre {
            info!(message = %action.log_message, "pre-transaction migration step");
            let stmt = action.statement.clone();
            self.transactor
                .run(move |conn, target| {
                    Box::pin(async move {
                        let sql = target.to_fragment(&stmt)?;
                        conn.execute(&sql).await
                    })
                })
                .await?;
        }

        let base = discovery.base.clone();
        let transactor = &self.transactor;
        let control_for_attempt = control.clone();
        let outcome = self
            .retry
            .run(&control, shutdown, move |_attempt| {
                let migration = migration.clone();
                let discovery = discovery.clone();
                let message = message.clone();
                let control = control_for_attempt.clone();
                async move { Self::attempt(transactor, control, &migration, &discovery, message).await }
            })
            .await?;

        match outcome {
            AttemptOutcome::AlreadyLoaded => Ok(LoadOutcome::AlreadyLoaded),
            AttemptOutcome::Loaded => {
                let entry = self.manifest.get(&base).await?;
                let ingestion = entry.map(|e| e.ingestion).ok_or_else(|| LoaderError::fatal_db("manifest row vanished after commit"))?;
                Ok(LoadOutcome::Loaded { ingestion })
            }
        }
    }

    async fn wait_ready(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.ready_check.timeout;
        loop {
            let check = self
                .transactor
                .run(|conn, target| {
                    Box::pin(async move {
                        let sql = target.to_fragment(&Statement::ReadyCheck)?;
                        conn.query_scalar(&sql).await
                    })
                })
                .await;
            if check.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LoaderError::transient_db("warehouse did not become ready before the ready-check timeout"));
            }
            tokio::time::sleep(self.ready_check.interval).await;
        }
    }

    async fn attempt(transactor: &Transactor, control: Arc<ControlSurface>, migration: &Migration, discovery: &DataDiscovery, message: ShreddingComplete) -> Result<AttemptOutcome> {
        let base = discovery.base.clone();
        let in_actions = migration.in_.clone();
        let discovery = discovery.clone();

        transactor
            .transact(move |conn, target| {
                Box::pin(async move {
                    control.set_stage(Stage::ManifestCheck);
                    if ManifestStore::get_within(conn, target, &base).await?.is_some() {
                        control.set_stage(Stage::Cancelling { reason: "Already loaded".to_string() });
                        return Ok(AttemptOutcome::AlreadyLoaded);
                    }

                    control.set_stage(Stage::MigrationIn);
                    for action in &in_actions {
                        let sql = target.to_fragment(&action.statement)?;
                        conn.execute(&sql).await?;
                    }

                    let existing_columns = if target.requires_events_columns() {
                        let sql = target.to_fragment(&Statement::GetColumns { name: "events".to_string() })?;
                        conn.query_rows(&sql)
                            .await?
                            .into_iter()
                            .filter_map(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
                            .collect()
                    } else {
                        Vec::new()
                    };

                    for statement in target.get_load_statements(&discovery, &existing_columns)? {
                        control.set_stage(Stage::Loading { table: statement.label().to_string() });
                        let sql = target.to_fragment(&statement)?;
                        conn.execute(&sql).await?;
                    }

                    control.set_stage(Stage::Committing);
                    ManifestStore::add(conn, target, message).await?;

                    Ok(AttemptOutcome::Loaded)
                })
            })
            .await
    }
}

/// Resolve every shredded type against the schema registry. Legacy JSON
/// shred types carry no columnar schema and are left unresolved
/// (`schema_list: None`); TSV and wide-row types are resolved to their
/// full migration chain.
async fn resolve_discovery(message: &ShreddingComplete, registry: &dyn SchemaRegistry) -> Result<DataDiscovery> {
    let mut shredded_types = Vec::with_capacity(message.types.len());
    for info in &message.types {
        let schema_list = match info.format {
            ShredFormat::Json => None,
            ShredFormat::Tsv | ShredFormat::WideRow => Some(registry.get_schemas(&info.vendor, &info.name, info.model).await?),
        };
        shredded_types.push(ShreddedType { info: info.clone(), schema_list });
    }
    Ok(DataDiscovery {
        base: message.base.clone(),
        compression: message.compression,
        shredded_types,
        timestamps: message.timestamps.clone(),
        processor: message.processor.clone(),
        count: message.count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::FakeColumnDiffer;
    use crate::model::{BatchTimestamps, Compression, ProcessorInfo, StorageFolder};
    use crate::retry::RetryConfig;
    use crate::target::{RedshiftTarget, Target};
    use crate::transactor::fake::{FakeConnection, FakeConnectionFactory};
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    fn message(base: &str) -> ShreddingComplete {
        ShreddingComplete {
            base: StorageFolder::parse(base).unwrap(),
            types: Vec::new(),
            timestamps: BatchTimestamps { job_started: chrono::Utc::now(), job_completed: chrono::Utc::now(), min_collector: None, max_collector: None },
            compression: Compression::Gzip,
            processor: ProcessorInfo { artifact: "rdb-shredder".to_string(), version: "5.0.0".to_string() },
            count: Some(1),
        }
    }

    fn machine(conn: Arc<FakeConnection>) -> LoadStateMachine {
        let factory = Arc::new(FakeConnectionFactory::new(conn));
        let differ = Arc::new(FakeColumnDiffer::new());
        let target: Arc<dyn Target> = Arc::new(RedshiftTarget::new("atomic", differ, false));
        let transactor = Arc::new(Transactor::new(factory, target));
        let manifest = Arc::new(ManifestStore::new(transactor.clone()));
        let registry = Arc::new(crate::collaborators::FakeRegistry::new());
        let retry = RetryController::new(RetryConfig { max_attempts: 1, ..RetryConfig::default() });
        let ready_check = ReadyCheckConfig { interval: Duration::from_millis(1), timeout: Duration::from_millis(50) };
        LoadStateMachine::new(transactor, manifest, registry, retry, ready_check)
    }

    fn manifest_row_json(base: &StorageFolder) -> String {
        let entry = crate::model::ManifestEntry {
            base: base.clone(),
            types: serde_json::json!([]),
            shredding_started: chrono::Utc::now(),
            shredding_completed: chrono::Utc::now(),
            min_collector: None,
            max_collector: None,
            ingestion: chrono::Utc::now(),
            compression: Compression::Gzip,
            processor: ProcessorInfo { artifact: "rdb-shredder".to_string(), version: "5.0.0".to_string() },
            count_good: Some(1),
        };
        serde_json::to_string(&entry).unwrap()
    }

    // S1 — first load of a fresh batch succeeds and reads back the
    // ingestion timestamp the manifest recorded.
    #[tokio::test]
    async fn first_load_succeeds_and_reads_back_ingestion() {
        let conn = Arc::new(FakeConnection::default());
        conn.scalar_responses.lock().push_back(Some("1".to_string())); // ready check
        conn.row_responses.lock().push_back(Vec::new()); // ManifestCheck: no row
        let msg = message("s3://bucket/run=1/");
        conn.row_responses.lock().push_back(vec![vec![manifest_row_json(&StorageFolder::parse("s3://bucket/run=1/").unwrap())]]); // readback

        let (_tx, rx) = watch::channel(false);
        let control = Arc::new(ControlSurface::new());
        control.make_busy(StorageFolder::parse("s3://bucket/run=1/").unwrap());
        let sm = machine(conn.clone());
        let outcome = sm.run(control.clone(), msg, rx).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { .. }));

        let executed = conn.executed.lock().clone();
        assert!(executed.iter().any(|s| s.contains("INSERT INTO")));
        assert!(executed.contains(&"COMMIT".to_string()));
    }

    // Property 1 — idempotence: a second load of the same base returns
    // AlreadyLoaded and performs no further manifest writes.
    #[tokio::test]
    async fn second_load_of_same_base_is_already_loaded() {
        let conn = Arc::new(FakeConnection::default());
        conn.scalar_responses.lock().push_back(Some("1".to_string())); // ready check
        let base = StorageFolder::parse("s3://bucket/run=1/").unwrap();
        conn.row_responses.lock().push_back(vec![vec![manifest_row_json(&base)]]); // ManifestCheck: already present

        let (_tx, rx) = watch::channel(false);
        let control = Arc::new(ControlSurface::new());
        control.make_busy(base.clone());
        let sm = machine(conn.clone());
        let outcome = sm.run(control.clone(), message("s3://bucket/run=1/"), rx).await.unwrap();
        assert_eq!(outcome, LoadOutcome::AlreadyLoaded);
        assert!(!conn.executed.lock().iter().any(|s| s.contains("INSERT INTO")));
        assert!(matches!(control.get(), crate::model::LoadStatus::Loading { stage: Some(Stage::Cancelling { .. }), .. }));
    }

    // Property 4 — transactionality: a failure during the copy rolls
    // back; no manifest row is written, and ABORT (not COMMIT) is
    // issued.
    #[tokio::test]
    async fn failure_during_copy_rolls_back_without_writing_manifest() {
        let conn = Arc::new(FakeConnection::default());
        conn.scalar_responses.lock().push_back(Some("1".to_string())); // ready check
        conn.row_responses.lock().push_back(Vec::new()); // ManifestCheck: no row
        *conn.fail_on_execute_containing.lock() = Some("COPY".to_string());

        let (_tx, rx) = watch::channel(false);
        let control = Arc::new(ControlSurface::new());
        control.make_busy(StorageFolder::parse("s3://bucket/run=1/").unwrap());
        let sm = machine(conn.clone());
        let result = sm.run(control.clone(), message("s3://bucket/run=1/"), rx).await;
        assert!(result.is_err());

        let executed = conn.executed.lock().clone();
        assert!(!executed.iter().any(|s| s.contains("INSERT INTO")));
        assert!(executed.contains(&"ABORT".to_string()));
        assert!(!executed.contains(&"COMMIT".to_string()));
    }

    /// Wraps a `Connection`, recording the control surface's stage at
    /// the moment of every `execute` call — enough to check property 3
    /// (stage monotonicity) without threading extra state through the
    /// state machine itself.
    struct StageLoggingConnection {
        inner: Arc<FakeConnection>,
        control: Arc<ControlSurface>,
        seen: Arc<SyncMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl crate::transactor::Connection for StageLoggingConnection {
        async fn execute(&self, sql: &crate::statement::SqlText) -> Result<()> {
            if let crate::model::LoadStatus::Loading { stage: Some(s), .. } = self.control.get() {
                self.seen.lock().push(s.name());
            }
            self.inner.execute(sql).await
        }

        async fn query_scalar(&self, sql: &crate::statement::SqlText) -> Result<Option<String>> {
            self.inner.query_scalar(sql).await
        }

        async fn query_rows(&self, sql: &crate::statement::SqlText) -> Result<Vec<Vec<String>>> {
            self.inner.query_rows(sql).await
        }
    }

    struct StageLoggingFactory {
        inner: Arc<FakeConnection>,
        control: Arc<ControlSurface>,
        seen: Arc<SyncMutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl crate::transactor::ConnectionFactory for StageLoggingFactory {
        async fn connect(&self) -> Result<Box<dyn crate::transactor::Connection>> {
            Ok(Box::new(StageLoggingConnection { inner: self.inner.clone(), control: self.control.clone(), seen: self.seen.clone() }))
        }
    }

    // Property 3 — stage monotonicity: observed stages form a prefix of
    // STAGE_ORDER (Cancelling may replace any suffix, but is absent on
    // the success path exercised here).
    #[tokio::test]
    async fn stages_advance_in_order_during_a_successful_load() {
        let conn = Arc::new(FakeConnection::default());
        conn.scalar_responses.lock().push_back(Some("1".to_string()));
        conn.row_responses.lock().push_back(Vec::new());
        let base = StorageFolder::parse("s3://bucket/run=1/").unwrap();
        conn.row_responses.lock().push_back(vec![vec![manifest_row_json(&base)]]);

        let control = Arc::new(ControlSurface::new());
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let factory = Arc::new(StageLoggingFactory { inner: conn, control: control.clone(), seen: seen.clone() });
        let differ = Arc::new(FakeColumnDiffer::new());
        let target: Arc<dyn Target> = Arc::new(RedshiftTarget::new("atomic", differ, false));
        let transactor = Arc::new(Transactor::new(factory, target));
        let manifest = Arc::new(ManifestStore::new(transactor.clone()));
        let registry = Arc::new(crate::collaborators::FakeRegistry::new());
        let retry = RetryController::new(RetryConfig { max_attempts: 1, ..RetryConfig::default() });
        let sm = LoadStateMachine::new(transactor, manifest, registry, retry, ReadyCheckConfig { interval: Duration::from_millis(1), timeout: Duration::from_millis(50) });

        control.make_busy(base.clone());
        let (_tx, rx) = watch::channel(false);
        sm.run(control.clone(), message("s3://bucket/run=1/"), rx).await.unwrap();

        let order = crate::model::status::STAGE_ORDER;
        let recorded = seen.lock().clone();
        let mut last_idx = 0usize;
        for name in recorded {
            let idx = order.iter().position(|n| *n == name).unwrap();
            assert!(idx >= last_idx, "stage {name} observed out of order");
            last_idx = idx;
        }
    }
}
