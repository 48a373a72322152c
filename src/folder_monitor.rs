//! The folder monitor (C8): on its own schedule, diffs object storage
//! against the manifest and alerts on orphaned (unloaded) folders.
//!
//! Runs outside any load transaction — `Transactor::run` hands it one
//! connection per tick, shared by the create/copy/diff/drop sequence, the
//! same shape `ManifestStore::initialize` uses for DDL outside a
//! transaction.

use crate::collaborators::ObjectStore;
use crate::control::ControlSurface;
use crate::error::Result;
use crate::model::StorageFolder;
use crate::monitoring::{AlertPayload, Monitoring};
use crate::statement::Statement;
use crate::transactor::Transactor;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct FolderMonitorConfig {
    /// How often a tick fires. A tick is skipped, not queued, if the
    /// control surface is busy when the timer goes off.
    pub period: Duration,
    /// How far back from "now" each tick's `list_prefixes` query
    /// window reaches.
    pub lookback: ChronoDuration,
    /// An absolute floor on top of `lookback` (§4.8's "since"
    /// convention) — `None` means `lookback` alone bounds the window.
    pub since: Option<DateTime<Utc>>,
}

pub struct FolderMonitor {
    transactor: Arc<Transactor>,
    object_store: Arc<dyn ObjectStore>,
    control: Arc<ControlSurface>,
    monitoring: Arc<dyn Monitoring>,
    shredder_output: StorageFolder,
    config: FolderMonitorConfig,
}

impl FolderMonitor {
    pub fn new(
        transactor: Arc<Transactor>,
        object_store: Arc<dyn ObjectStore>,
        control: Arc<ControlSurface>,
        monitoring: Arc<dyn Monitoring>,
        shredder_output: StorageFolder,
        config: FolderMonitorConfig,
    ) -> Self {
        FolderMonitor { transactor, object_store, control, monitoring, shredder_output, config }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            if self.control.is_busy() {
                // Skipped, not queued — the next timer fire re-checks.
            } else if let Err(e) = self.tick().await {
                warn!(error = %e, "folder monitor tick failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.period) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let since = self.window_floor();
        let prefixes = self.object_store.list_prefixes(&self.shredder_output, since).await?;
        if prefixes.is_empty() {
            return Ok(());
        }

        let orphans = self
            .transactor
            .run(move |conn, target| {
                Box::pin(async move {
                    let create = target.to_fragment(&Statement::CreateAlertingTempTable)?;
                    conn.execute(&create).await?;

                    for source in &prefixes {
                        let copy = target.to_fragment(&Statement::FoldersCopy { source: source.clone() })?;
                        conn.execute(&copy).await?;
                    }

                    let diff = target.to_fragment(&Statement::FoldersMinusManifest)?;
                    let rows = conn.query_rows(&diff).await?;

                    let drop = target.to_fragment(&Statement::DropAlertingTempTable)?;
                    conn.execute(&drop).await?;

                    let orphans = rows
                        .into_iter()
                        .filter_map(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
                        .filter_map(|uri| StorageFolder::parse(&uri).ok())
                        .collect::<Vec<_>>();
                    Ok(orphans)
                })
            })
            .await?;

        for base in orphans {
            self.monitoring.alert(AlertPayload::warning("Unloaded folder found", Some(base)));
        }
        Ok(())
    }

    fn window_floor(&self) -> DateTime<Utc> {
        let lookback_floor = Utc::now() - self.config.lookback;
        match self.config.since {
            Some(since) => since.max(lookback_floor),
            None => lookback_floor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FakeColumnDiffer, FakeObjectStore};
    use crate::monitoring::RecordingMonitoring;
    use crate::target::{RedshiftTarget, Target};
    use crate::transactor::fake::{FakeConnection, FakeConnectionFactory};

    fn monitor_with(conn: Arc<FakeConnection>, store: Arc<FakeObjectStore>) -> (FolderMonitor, Arc<RecordingMonitoring>, Arc<ControlSurface>) {
        let factory = Arc::new(FakeConnectionFactory::new(conn));
        let differ = Arc::new(FakeColumnDiffer::new());
        let target: Arc<dyn Target> = Arc::new(RedshiftTarget::new("atomic", differ, false));
        let transactor = Arc::new(Transactor::new(factory, target));
        let control = Arc::new(ControlSurface::new());
        let monitoring = Arc::new(RecordingMonitoring::default());
        let monitor = FolderMonitor::new(
            transactor,
            store,
            control.clone(),
            monitoring.clone(),
            StorageFolder::parse("s3://bucket/shredded/").unwrap(),
            FolderMonitorConfig { period: Duration::from_secs(300), lookback: ChronoDuration::hours(1), since: None },
        );
        (monitor, monitoring, control)
    }

    #[tokio::test]
    async fn skips_the_db_round_trip_when_storage_has_nothing_new() {
        let conn = Arc::new(FakeConnection::default());
        let store = Arc::new(FakeObjectStore::new());
        let (monitor, monitoring, _control) = monitor_with(conn.clone(), store);

        monitor.tick().await.unwrap();

        assert!(conn.executed.lock().is_empty());
        assert!(monitoring.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn alerts_once_per_orphaned_folder_and_drops_the_temp_table() {
        let conn = Arc::new(FakeConnection::default());
        let orphan = StorageFolder::parse("s3://bucket/shredded/run=1/").unwrap();
        conn.row_responses.lock().push_back(vec![vec![orphan.to_string()]]);

        let store = Arc::new(FakeObjectStore::new());
        store.add(orphan.clone(), Utc::now());
        let (monitor, monitoring, _control) = monitor_with(conn.clone(), store);

        monitor.tick().await.unwrap();

        let executed = conn.executed.lock().clone();
        assert!(executed.iter().any(|s| s.contains("rdb_folder_monitoring") || s.to_lowercase().contains("create")));
        assert_eq!(monitoring.alerts.lock().len(), 1);
        assert_eq!(monitoring.alerts.lock()[0].folder.as_ref(), Some(&orphan));
    }

    #[tokio::test]
    async fn skips_the_tick_entirely_when_the_control_surface_is_busy() {
        let conn = Arc::new(FakeConnection::default());
        let orphan = StorageFolder::parse("s3://bucket/shredded/run=1/").unwrap();
        conn.row_responses.lock().push_back(vec![vec![orphan.to_string()]]);
        let store = Arc::new(FakeObjectStore::new());
        store.add(orphan.clone(), Utc::now());
        let (monitor, monitoring, control) = monitor_with(conn.clone(), store);
        control.make_busy(StorageFolder::parse("s3://bucket/run=9/").unwrap());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { monitor.run(rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(conn.executed.lock().is_empty());
        assert!(monitoring.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn since_convention_takes_the_later_of_since_and_the_lookback_floor() {
        let conn = Arc::new(FakeConnection::default());
        let store = Arc::new(FakeObjectStore::new());
        let factory = Arc::new(FakeConnectionFactory::new(conn));
        let differ = Arc::new(FakeColumnDiffer::new());
        let target: Arc<dyn Target> = Arc::new(RedshiftTarget::new("atomic", differ, false));
        let transactor = Arc::new(Transactor::new(factory, target));
        let control = Arc::new(ControlSurface::new());
        let monitoring = Arc::new(RecordingMonitoring::default());

        // `since` is more recent than the lookback floor: the floor must
        // not override it with an earlier instant.
        let recent_since = Utc::now() - ChronoDuration::minutes(1);
        let monitor = FolderMonitor::new(
            transactor.clone(),
            store.clone(),
            control.clone(),
            monitoring.clone(),
            StorageFolder::parse("s3://bucket/shredded/").unwrap(),
            FolderMonitorConfig { period: Duration::from_secs(1), lookback: ChronoDuration::hours(1), since: Some(recent_since) },
        );
        assert_eq!(monitor.window_floor(), recent_since);

        // `since` predates the lookback window: the lookback floor wins,
        // keeping each tick's query bounded.
        let stale_since = Utc::now() - ChronoDuration::days(30);
        let monitor = FolderMonitor::new(
            transactor,
            store,
            control,
            monitoring,
            StorageFolder::parse("s3://bucket/shredded/").unwrap(),
            FolderMonitorConfig { period: Duration::from_secs(1), lookback: ChronoDuration::hours(1), since: Some(stale_since) },
        );
        assert!(monitor.window_floor() > stale_since);
    }
}
