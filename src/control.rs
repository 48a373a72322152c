//! The control surface (C9): the single owner of the process-wide
//! `LoadStatus`, plus attempt/message counters. All mutations are
//! serialized behind a `parking_lot::RwLock` never held across an
//! `.await`; a `tokio::sync::watch` channel gives readers (folder
//! monitor, no-op scheduler) a live snapshot without polling.
//!
//! Grounded on the teacher's `pool::session_manager` state-registry
//! pattern.

use crate::model::{LoadStatus, StorageFolder, Stage};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

pub struct ControlSurface {
    status: RwLock<LoadStatus>,
    signal_tx: watch::Sender<LoadStatus>,
    messages_seen: AtomicU64,
    loaded: AtomicU64,
    attempts: AtomicU64,
}

impl ControlSurface {
    pub fn new() -> Self {
        let (signal_tx, _rx) = watch::channel(LoadStatus::Idle);
        ControlSurface {
            status: RwLock::new(LoadStatus::Idle),
            signal_tx,
            messages_seen: AtomicU64::new(0),
            loaded: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> LoadStatus {
        self.status.read().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.status.read().is_busy()
    }

    pub fn make_busy(&self, folder: StorageFolder) {
        let next = LoadStatus::Loading { folder, stage: None };
        *self.status.write() = next.clone();
        let _ = self.signal_tx.send(next);
    }

    pub fn make_idle(&self) {
        *self.status.write() = LoadStatus::Idle;
        let _ = self.signal_tx.send(LoadStatus::Idle);
    }

    pub fn make_paused(&self, owner: impl Into<String>) {
        let next = LoadStatus::Paused { owner: owner.into() };
        *self.status.write() = next.clone();
        let _ = self.signal_tx.send(next);
    }

    /// A no-op when the current status is not `Loading` (defensive:
    /// stage transitions only make sense mid-load).
    pub fn set_stage(&self, stage: Stage) {
        let mut guard = self.status.write();
        if let LoadStatus::Loading { folder, .. } = &*guard {
            let next = LoadStatus::Loading { folder: folder.clone(), stage: Some(stage) };
            *guard = next.clone();
            let _ = self.signal_tx.send(next);
        }
    }

    pub fn increment_messages(&self) {
        self.messages_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_loaded(&self) {
        self.loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_seen(&self) -> u64 {
        self.messages_seen.load(Ordering::Relaxed)
    }

    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::Relaxed)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Subscribe to live `LoadStatus` changes without polling.
    pub fn signal(&self) -> watch::Receiver<LoadStatus> {
        self.signal_tx.subscribe()
    }
}

impl Default for ControlSurface {
    fn default() -> Self {
        ControlSurface::new()
    }
}

pub type SharedControl = Arc<ControlSurface>;
