//! Human-readable status lines for the control surface.
//!
//! Every line goes to the `log` facade. When `show_logs` is on, lines are
//! also broadcast to subscribers (IPC clients running `spanctl watch`).

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

pub struct StatusLog {
    tx: broadcast::Sender<String>,
    enabled: AtomicBool,
}

impl StatusLog {
    pub fn new(enabled: bool) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn emit(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);

        if self.is_enabled() {
            // No subscribers is fine
            let _ = self.tx.send(message);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(true)
    }
}
