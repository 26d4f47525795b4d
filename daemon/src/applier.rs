use common::SpanwallError;
use std::path::Path;

use crate::desktop::Desktop;
use crate::status::StatusLog;

/// Set the composited canvas as the system wallpaper.
///
/// The tiling preference is written first so the OS lays the canvas out
/// across the whole virtual desktop. A failure there is reported but does
/// not stop the wallpaper call.
pub fn apply(desktop: &dyn Desktop, path: &Path, status: &StatusLog) -> Result<(), SpanwallError> {
    if !path.exists() {
        return Err(SpanwallError::NotFound(format!(
            "canvas {} does not exist",
            path.display()
        )));
    }

    let absolute = std::path::absolute(path)?;

    if let Err(e) = desktop.set_tile_mode() {
        status.emit(format!("Registry set error: {}", e));
    }

    desktop.set_wallpaper(&absolute)?;
    status.emit("Wallpaper updated.");
    Ok(())
}
