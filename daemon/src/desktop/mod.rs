//! Operating system boundary.
//!
//! Display enumeration, the tiling preference and the wallpaper call all go
//! through [`Desktop`] so the scheduler and compositor never touch platform
//! APIs directly.

use common::{MonitorDescriptor, SpanwallError};
use std::path::Path;
use std::sync::Arc;

#[cfg(not(windows))]
mod headless;
#[cfg(windows)]
mod windows;

pub trait Desktop: Send + Sync {
    /// Active displays in OS enumeration order
    fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, SpanwallError>;

    /// Select tiled rendering for the desktop background
    fn set_tile_mode(&self) -> Result<(), SpanwallError>;

    /// Assign `path` (absolute) as the desktop background, persisting it to
    /// the user profile and notifying other listeners
    fn set_wallpaper(&self, path: &Path) -> Result<(), SpanwallError>;
}

/// The backend for the platform this binary was built for
pub fn system() -> Arc<dyn Desktop> {
    #[cfg(windows)]
    {
        Arc::new(windows::WindowsDesktop)
    }

    #[cfg(not(windows))]
    {
        log::warn!("Windows desktop APIs unavailable on this platform, running headless");
        Arc::new(headless::HeadlessDesktop)
    }
}
