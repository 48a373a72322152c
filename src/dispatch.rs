//! The discovery & dispatch loop (C7): receives queue messages, enforces
//! single-flight against the control surface, and turns a load's outcome
//! into the ack/alert policy from §4.7. The no-op scheduler — one of the
//! three concurrent streams this component composes — also lives here;
//! the folder monitor (the third stream) is its own module (C8).

use crate::collaborators::{MessageQueue, QueueMessage};
use crate::control::ControlSurface;
use crate::error::{LoaderError, Result};
use crate::load_state_machine::{LoadOutcome, LoadStateMachine};
use crate::model::{LoadStatus, ShreddingComplete, StorageFolder};
use crate::monitoring::{AlertPayload, Monitoring, SuccessPayload};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct VisibilityConfig {
    /// How often the visibility-extension companion task renews the
    /// in-flight message. Must be less than the queue's own visibility
    /// timeout (§4.7 contract 2).
    pub extend_every: Duration,
    pub extend_by: Duration,
}

pub struct Dispatch {
    app_name: String,
    queue: Arc<dyn MessageQueue>,
    control: Arc<ControlSurface>,
    monitoring: Arc<dyn Monitoring>,
    state_machine: Arc<LoadStateMachine>,
    visibility: VisibilityConfig,
    poll_interval: Duration,
}

impl Dispatch {
    pub fn new(
        app_name: impl Into<String>,
        queue: Arc<dyn MessageQueue>,
        control: Arc<ControlSurface>,
        monitoring: Arc<dyn Monitoring>,
        state_machine: Arc<LoadStateMachine>,
        visibility: VisibilityConfig,
        poll_interval: Duration,
    ) -> Self {
        Dispatch { app_name: app_name.into(), queue, control, monitoring, state_machine, visibility, poll_interval }
    }

    /// The main discovery stream: gated by `isBusy`, runs until
    /// `shutdown` fires or a load fails exceptionally (the error
    /// propagates, terminating the stream — the supervisor restarts the
    /// process).
    pub async fn run_discovery(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            if self.control.is_busy() {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => continue,
                    _ = shutdown.changed() => return Ok(()),
                }
            }

            let received = tokio::select! {
                r = self.queue.receive() => r?,
                _ = shutdown.changed() => return Ok(()),
            };

            let Some(msg) = received else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            self.process_one(msg, shutdown.clone()).await?;
        }
    }

    /// Handle one received message end to end: parse, run the load
    /// state machine, report the outcome, and ack. Acks unconditionally
    /// once the message has been parsed — a nack would re-deliver a
    /// batch forever since the data is already durable in storage.
    async fn process_one(&self, msg: Box<dyn QueueMessage>, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.control.increment_messages();

        let message: ShreddingComplete = match serde_json::from_str(msg.body()) {
            Ok(m) => m,
            Err(e) => {
                let err = LoaderError::from(e);
                warn!(error = %err, "malformed queue message");
                self.monitoring.alert(AlertPayload::error(err.to_string(), None));
                self.monitoring.track_exception(&err);
                msg.ack().await?;
                return Ok(());
            }
        };

        let base = message.base.clone();
        self.control.make_busy(base.clone());

        let msg: Arc<dyn QueueMessage> = Arc::from(msg);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let extender = self.spawn_visibility_extender(msg.clone(), cancel_rx);

        let started = Utc::now();
        let attempts_before = self.control.attempts();
        let outcome = self.state_machine.run(self.control.clone(), message.clone(), shutdown).await;

        let _ = cancel_tx.send(true);
        extender.abort();

        let result = self.report_outcome(outcome, &base, &message, started, attempts_before);
        msg.ack().await?;
        self.control.make_idle();
        result
    }

    fn report_outcome(
        &self,
        outcome: Result<LoadOutcome>,
        base: &StorageFolder,
        message: &ShreddingComplete,
        started: DateTime<Utc>,
        attempts_before: u64,
    ) -> Result<()> {
        match outcome {
            Ok(LoadOutcome::Loaded { ingestion }) => {
                let attempts = self.control.attempts().saturating_sub(attempts_before).max(1);
                self.monitoring.success(SuccessPayload {
                    app: self.app_name.clone(),
                    base: base.clone(),
                    ingestion,
                    started,
                    attempts,
                    shredding_started: message.timestamps.job_started,
                    shredding_completed: message.timestamps.job_completed,
                    metrics: None,
                });
                self.control.increment_loaded();
                Ok(())
            }
            Ok(LoadOutcome::AlreadyLoaded) => {
                self.monitoring.alert(AlertPayload::info("already loaded", Some(base.clone())));
                Ok(())
            }
            Err(e) => {
                self.monitoring.alert(AlertPayload::error(e.to_string(), Some(base.clone())));
                self.monitoring.track_exception(&e);
                info!(base = %base, error = %e, "load failed, acking and terminating the stream");
                Err(e)
            }
        }
    }

    fn spawn_visibility_extender(&self, msg: Arc<dyn QueueMessage>, mut cancel: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let period = self.visibility.extend_every;
        let extension = self.visibility.extend_by;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        let _ = msg.extend(extension).await;
                    }
                    _ = cancel.changed() => return,
                }
            }
        })
    }
}

/// One pre-resolved no-op window: cron expression evaluation happens at
/// config load time (out of scope per §1's "CLI parsing, config file
/// loading... out of scope"); the scheduler itself only compares `now`
/// against already-resolved `[start, end)` instants.
#[derive(Debug, Clone)]
pub struct NoOpWindow {
    pub owner: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The third concurrent stream: toggles `Paused{owner}` across
/// configured windows and blocks discovery for their duration. Never
/// interrupts an in-flight load — a window only takes effect while the
/// control surface is `Idle`.
pub async fn run_no_op_scheduler(control: Arc<ControlSurface>, windows: Vec<NoOpWindow>, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let now = Utc::now();
        let active = windows.iter().find(|w| now >= w.start && now < w.end);
        match active {
            Some(w) => {
                if matches!(control.get(), LoadStatus::Idle) {
                    control.make_paused(w.owner.clone());
                }
            }
            None => {
                if matches!(control.get(), LoadStatus::Paused { .. }) {
                    control.make_idle();
                }
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// The composition point for contract 4 (§4.7): spawns the three
/// concurrent streams and waits for the first one to stop. The
/// discovery stream stopping (clean shutdown or a propagated load
/// failure) ends the daemon; the folder monitor and no-op scheduler
/// only stop in response to the same `shutdown` signal.
pub async fn run_daemon(
    dispatch: Arc<Dispatch>,
    folder_monitor: Arc<crate::folder_monitor::FolderMonitor>,
    no_op_control: Arc<ControlSurface>,
    no_op_windows: Vec<NoOpWindow>,
    no_op_poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let discovery = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { dispatch.run_discovery(shutdown).await }
    });
    let folders = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { folder_monitor.run(shutdown).await }
    });
    let no_op = tokio::spawn(run_no_op_scheduler(no_op_control, no_op_windows, no_op_poll_interval, shutdown));

    let result = discovery.await.map_err(|e| LoaderError::runtime(format!("discovery task panicked: {e}")))?;
    folders.abort();
    no_op.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FakeColumnDiffer, FakeQueue, FakeRegistry};
    use crate::manifest_store::ManifestStore;
    use crate::model::{BatchTimestamps, Compression, ProcessorInfo};
    use crate::monitoring::RecordingMonitoring;
    use crate::retry::{RetryConfig, RetryController};
    use crate::target::{RedshiftTarget, Target};
    use crate::transactor::fake::{FakeConnection, FakeConnectionFactory};

    fn visibility() -> VisibilityConfig {
        VisibilityConfig { extend_every: Duration::from_secs(60), extend_by: Duration::from_secs(120) }
    }

    fn body(base: &str) -> String {
        serde_json::to_string(&ShreddingComplete {
            base: StorageFolder::parse(base).unwrap(),
            types: Vec::new(),
            timestamps: BatchTimestamps { job_started: Utc::now(), job_completed: Utc::now(), min_collector: None, max_collector: None },
            compression: Compression::Gzip,
            processor: ProcessorInfo { artifact: "rdb-shredder".to_string(), version: "5.0.0".to_string() },
            count: Some(1),
        })
        .unwrap()
    }

    fn dispatch_with(conn: Arc<FakeConnection>, queue: Arc<dyn MessageQueue>) -> (Dispatch, Arc<RecordingMonitoring>, Arc<ControlSurface>) {
        let factory = Arc::new(FakeConnectionFactory::new(conn));
        let differ = Arc::new(FakeColumnDiffer::new());
        let target: Arc<dyn Target> = Arc::new(RedshiftTarget::new("atomic", differ, false));
        let transactor = Arc::new(crate::transactor::Transactor::new(factory, target));
        let manifest = Arc::new(ManifestStore::new(transactor.clone()));
        let registry: Arc<dyn crate::collaborators::SchemaRegistry> = Arc::new(FakeRegistry::new());
        let retry = RetryController::new(RetryConfig { max_attempts: 1, ..RetryConfig::default() });
        let state_machine = Arc::new(LoadStateMachine::new(
            transactor,
            manifest,
            registry,
            retry,
            crate::load_state_machine::ReadyCheckConfig { interval: Duration::from_millis(1), timeout: Duration::from_millis(50) },
        ));
        let control = Arc::new(ControlSurface::new());
        let monitoring = Arc::new(RecordingMonitoring::default());
        let dispatch = Dispatch::new(
            "rdb-loader",
            queue,
            control.clone(),
            monitoring.clone(),
            state_machine,
            visibility(),
            Duration::from_millis(1),
        );
        (dispatch, monitoring, control)
    }

    fn manifest_row_json(base: &StorageFolder) -> String {
        let entry = crate::model::ManifestEntry {
            base: base.clone(),
            types: serde_json::json!([]),
            shredding_started: Utc::now(),
            shredding_completed: Utc::now(),
            min_collector: None,
            max_collector: None,
            ingestion: Utc::now(),
            compression: Compression::Gzip,
            processor: ProcessorInfo { artifact: "rdb-shredder".to_string(), version: "5.0.0".to_string() },
            count_good: Some(1),
        };
        serde_json::to_string(&entry).unwrap()
    }

    #[tokio::test]
    async fn malformed_message_is_alerted_and_acked_without_touching_the_load_state_machine() {
        let conn = Arc::new(FakeConnection::default());
        let queue: Arc<dyn MessageQueue> = Arc::new(FakeQueue::new(vec!["not json".to_string()]));
        let (dispatch, monitoring, control) = dispatch_with(conn.clone(), queue.clone());
        let msg = queue.receive().await.unwrap().unwrap();
        let (_tx, rx) = watch::channel(false);

        dispatch.process_one(msg, rx).await.unwrap();

        assert_eq!(monitoring.alerts.lock().len(), 1);
        assert!(!control.is_busy());
        assert!(conn.executed.lock().is_empty());
    }

    #[tokio::test]
    async fn successful_load_reports_success_and_goes_idle() {
        let conn = Arc::new(FakeConnection::default());
        conn.scalar_responses.lock().push_back(Some("1".to_string()));
        conn.row_responses.lock().push_back(Vec::new());
        let base = StorageFolder::parse("s3://bucket/run=1/").unwrap();
        conn.row_responses.lock().push_back(vec![vec![manifest_row_json(&base)]]);

        let body = body("s3://bucket/run=1/");
        let queue: Arc<dyn MessageQueue> = Arc::new(FakeQueue::new(vec![body]));
        let (dispatch, monitoring, control) = dispatch_with(conn, queue.clone());
        let msg = queue.receive().await.unwrap().unwrap();
        let (_tx, rx) = watch::channel(false);

        dispatch.process_one(msg, rx).await.unwrap();

        assert_eq!(monitoring.successes.lock().len(), 1);
        assert!(monitoring.alerts.lock().is_empty());
        assert!(!control.is_busy());
        assert_eq!(control.loaded(), 1);
    }

    #[tokio::test]
    async fn already_loaded_is_alerted_and_acked_without_propagating_an_error() {
        let conn = Arc::new(FakeConnection::default());
        conn.scalar_responses.lock().push_back(Some("1".to_string()));
        let base = StorageFolder::parse("s3://bucket/run=1/").unwrap();
        conn.row_responses.lock().push_back(vec![vec![manifest_row_json(&base)]]);

        let body = body("s3://bucket/run=1/");
        let queue: Arc<dyn MessageQueue> = Arc::new(FakeQueue::new(vec![body]));
        let (dispatch, monitoring, control) = dispatch_with(conn, queue.clone());
        let msg = queue.receive().await.unwrap().unwrap();
        let (_tx, rx) = watch::channel(false);

        dispatch.process_one(msg, rx).await.unwrap();

        assert_eq!(monitoring.alerts.lock().len(), 1);
        assert!(monitoring.successes.lock().is_empty());
        assert!(!control.is_busy());
    }

    #[tokio::test]
    async fn exceptional_failure_acks_but_propagates_the_error() {
        let conn = Arc::new(FakeConnection::default());
        conn.scalar_responses.lock().push_back(Some("1".to_string()));
        conn.row_responses.lock().push_back(Vec::new());
        *conn.fail_on_execute_containing.lock() = Some("COPY".to_string());

        let body = body("s3://bucket/run=1/");
        let queue: Arc<dyn MessageQueue> = Arc::new(FakeQueue::new(vec![body]));
        let (dispatch, monitoring, control) = dispatch_with(conn, queue.clone());
        let msg = queue.receive().await.unwrap().unwrap();
        let (_tx, rx) = watch::channel(false);

        let result = dispatch.process_one(msg, rx).await;
        assert!(result.is_err());
        assert_eq!(monitoring.alerts.lock().len(), 1);
        assert!(!control.is_busy());
    }

    #[tokio::test]
    async fn no_op_scheduler_pauses_only_during_its_window() {
        let control = Arc::new(ControlSurface::new());
        let now = Utc::now();
        let windows = vec![NoOpWindow { owner: "maintenance".to_string(), start: now - chrono::Duration::seconds(5), end: now + chrono::Duration::seconds(5) }];
        let (tx, rx) = watch::channel(false);
        let control2 = control.clone();
        let handle = tokio::spawn(run_no_op_scheduler(control2, windows, Duration::from_millis(1), rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(control.get(), LoadStatus::Paused { .. }));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
