//! Shared fixtures for the daemon integration tests
#![allow(dead_code)]

use common::{MonitorDescriptor, SpanwallError};
use daemon::desktop::Desktop;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum DesktopCall {
    Tile,
    Wallpaper(PathBuf),
}

/// Fake OS backend with a fixed layout that records apply calls
pub struct RecordingDesktop {
    monitors: Vec<MonitorDescriptor>,
    calls: Mutex<Vec<DesktopCall>>,
}

impl RecordingDesktop {
    pub fn new(monitors: Vec<MonitorDescriptor>) -> Self {
        Self {
            monitors,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<DesktopCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Desktop for RecordingDesktop {
    fn enumerate_monitors(&self) -> Result<Vec<MonitorDescriptor>, SpanwallError> {
        Ok(self.monitors.clone())
    }

    fn set_tile_mode(&self) -> Result<(), SpanwallError> {
        self.calls.lock().unwrap().push(DesktopCall::Tile);
        Ok(())
    }

    fn set_wallpaper(&self, path: &Path) -> Result<(), SpanwallError> {
        self.calls
            .lock()
            .unwrap()
            .push(DesktopCall::Wallpaper(path.to_path_buf()));
        Ok(())
    }
}

pub fn monitor(name: &str, x: i32, y: i32, width: u32, height: u32) -> MonitorDescriptor {
    MonitorDescriptor {
        name: name.to_string(),
        x,
        y,
        width,
        height,
    }
}

/// Write a single-color PNG and return its path as stored in the config
pub fn solid_png(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 3]) -> String {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(&path)
        .unwrap();
    path.to_string_lossy().into_owned()
}
