use common::MonitorDescriptor;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ConfigStore;
use crate::desktop::Desktop;
use crate::status::StatusLog;

/// Current display layout, replaced wholesale on every detection
pub struct MonitorTopology {
    desktop: Arc<dyn Desktop>,
    monitors: Mutex<Vec<MonitorDescriptor>>,
}

impl MonitorTopology {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self {
            desktop,
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Enumerate displays, make sure each has a config record, and replace
    /// the in-memory layout.
    ///
    /// Enumeration failure counts as "no monitors".
    pub fn detect(&self, store: &ConfigStore, status: &StatusLog) -> Vec<MonitorDescriptor> {
        let detected = self.desktop.enumerate_monitors().unwrap_or_else(|e| {
            log::warn!("{}", e);
            Vec::new()
        });

        for monitor in &detected {
            log::debug!(
                "Monitor {} at ({}, {}) {}x{}",
                monitor.name,
                monitor.x,
                monitor.y,
                monitor.width,
                monitor.height
            );
        }

        let added = store.ensure_monitors(detected.iter().map(|m| m.name.as_str()));
        for name in &added {
            log::info!("New monitor {}, created default settings", name);
        }

        *self.monitors.lock().unwrap_or_else(PoisonError::into_inner) = detected.clone();
        status.emit(format!("Detected {} monitors.", detected.len()));

        detected
    }

    /// Layout from the most recent detection
    pub fn monitors(&self) -> Vec<MonitorDescriptor> {
        self.monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn desktop(&self) -> &dyn Desktop {
        self.desktop.as_ref()
    }
}
