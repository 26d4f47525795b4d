use common::{MonitorDescriptor, SpanwallError};
use std::path::Path;

use super::Desktop;

/// Stand-in used where the Windows desktop is not available: no displays,
/// and every apply attempt fails.
pub struct HeadlessDesktop;

impl Desktop for HeadlessDesktop {
    fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, SpanwallError> {
        Ok(Vec::new())
    }

    fn set_tile_mode(&self) -> Result<(), SpanwallError> {
        Err(SpanwallError::OsApply(
            "tiling preference is only available on Windows".to_string(),
        ))
    }

    fn set_wallpaper(&self, path: &Path) -> Result<(), SpanwallError> {
        Err(SpanwallError::OsApply(format!(
            "cannot set {} as wallpaper on this platform",
            path.display()
        )))
    }
}
