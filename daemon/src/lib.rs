//! spanwall daemon library.
//!
//! Rotates per-monitor slideshows, stitches the current selections into one
//! canvas covering the virtual desktop and applies it as a tiled wallpaper.

#[macro_use]
mod macros;

pub mod applier;
pub mod compositor;
pub mod config;
pub mod desktop;
pub mod image_sources;
pub mod ipc_server;
pub mod scheduler;
pub mod status;
pub mod topology;

use common::{DaemonStatus, MonitorDescriptor, SelectionStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{Notify, watch};

use crate::config::ConfigStore;
use crate::desktop::Desktop;
use crate::status::StatusLog;
use crate::topology::MonitorTopology;

/// Shared daemon state
pub struct DaemonState {
    pub store: ConfigStore,
    pub topology: MonitorTopology,
    pub status: Arc<StatusLog>,
    pub start_time: Instant,
    /// Selections of the last composite, for status queries
    selections: Mutex<BTreeMap<String, String>>,
    refresh: Notify,
    shutdown: watch::Sender<bool>,
}

impl DaemonState {
    pub fn new(config_path: impl Into<PathBuf>, desktop: Arc<dyn Desktop>) -> Self {
        let status = Arc::new(StatusLog::default());
        let store = ConfigStore::open(config_path, status.clone());
        let (shutdown, _) = watch::channel(false);

        Self {
            store,
            topology: MonitorTopology::new(desktop),
            status,
            start_time: Instant::now(),
            selections: Mutex::new(BTreeMap::new()),
            refresh: Notify::new(),
            shutdown,
        }
    }

    /// Re-enumerate displays and register any new ones with the store
    pub fn detect_monitors(&self) -> Vec<MonitorDescriptor> {
        self.topology.detect(&self.store, &self.status)
    }

    /// Ask the scheduler to recomposite without waiting for a rotation
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    pub async fn refresh_requested(&self) {
        self.refresh.notified().await;
    }

    pub fn request_shutdown(&self) {
        log::info!("Shutdown requested");
        self.shutdown.send_replace(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn publish_selections(&self, selections: BTreeMap<String, String>) {
        *self
            .selections
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = selections;
    }

    pub fn selections(&self) -> BTreeMap<String, String> {
        self.selections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn status_report(&self) -> DaemonStatus {
        DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.uptime_secs(),
            monitors: self.topology.monitors(),
            selections: self
                .selections()
                .into_iter()
                .map(|(monitor, image)| SelectionStatus { monitor, image })
                .collect(),
        }
    }
}
