//! Common types and utilities for spanwall.
//!
//! This crate defines the shared data model and the IPC protocol used for
//! communication between the daemon (`spanwall`) and the control client
//! (`spanctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a local TCP socket using newline-delimited,
//! JSON-serialized messages. The client sends [`Command`] variants and
//! receives [`Response`] variants.
//!
//! # Examples
//!
//! ```
//! use common::Command;
//!
//! let cmd = Command::ShiftImage {
//!     monitor: r"\\.\DISPLAY1".to_string(),
//!     src: 0,
//!     dest: 2,
//! };
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! assert!(json.contains("ShiftImage"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default address of the daemon's IPC listener.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:47615";

/// Default rotation interval for a monitor, in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanwallError {
    #[error("Configuration I/O error: {0}")]
    ConfigIo(String),

    #[error("Monitor enumeration failed: {0}")]
    MonitorEnumeration(String),

    #[error("Image error: {0}")]
    ImageDecode(String),

    #[error("Wallpaper apply error: {0}")]
    OsApply(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl From<std::io::Error> for SpanwallError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SpanwallError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// One physical display in virtual-desktop coordinates.
///
/// `x`/`y` may be negative for displays placed left of or above the primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorDescriptor {
    /// Stable device identifier, e.g. `\\.\DISPLAY1`
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl MonitorDescriptor {
    /// Build a descriptor from a `left, top, right, bottom` rectangle.
    ///
    /// Returns `None` for degenerate rectangles.
    pub fn from_rect(name: impl Into<String>, left: i32, top: i32, right: i32, bottom: i32) -> Option<Self> {
        let width = u32::try_from(i64::from(right) - i64::from(left)).ok()?;
        let height = u32::try_from(i64::from(bottom) - i64::from(top)).ok()?;
        if width == 0 || height == 0 {
            return None;
        }

        Some(Self {
            name: name.into(),
            x: left,
            y: top,
            width,
            height,
        })
    }

    pub fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Exclusive right edge
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }
}

/// Per-monitor slideshow settings as persisted in the configuration document.
///
/// Keys this version does not know about are kept in `extra` so a load/save
/// cycle never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSlideshowConfig {
    #[serde(default)]
    pub images: Vec<String>,

    #[serde(rename = "interval", default = "default_interval")]
    pub interval_seconds: u64,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub last_index: usize,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for MonitorSlideshowConfig {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            interval_seconds: DEFAULT_INTERVAL_SECS,
            enabled: false,
            last_index: 0,
            extra: Map::new(),
        }
    }
}

impl MonitorSlideshowConfig {
    /// Enabled and has at least one image
    pub fn is_active(&self) -> bool {
        self.enabled && !self.images.is_empty()
    }

    /// `last_index` wrapped into the current image list
    pub fn wrapped_index(&self) -> Option<usize> {
        if self.images.is_empty() {
            None
        } else {
            Some(self.last_index % self.images.len())
        }
    }

    /// Image at the wrapped `last_index`
    pub fn current_image(&self) -> Option<&str> {
        self.wrapped_index().map(|i| self.images[i].as_str())
    }

    /// Index the next rotation lands on
    pub fn next_index(&self) -> Option<usize> {
        self.wrapped_index().map(|i| (i + 1) % self.images.len())
    }
}

/// Supported interface languages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Tr,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Tr => "tr",
            Self::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = SpanwallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tr" => Ok(Self::Tr),
            "en" => Ok(Self::En),
            other => Err(SpanwallError::InvalidValue {
                key: "language".to_string(),
                reason: format!("unsupported language '{}' (expected tr or en)", other),
            }),
        }
    }
}

/// Global application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub language: Language,

    #[serde(default = "default_true")]
    pub show_logs: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            language: Language::default(),
            show_logs: true,
            extra: Map::new(),
        }
    }
}

/// Commands sent from client to daemon via IPC.
///
/// Monitor-scoped commands never fail for an unknown monitor name; they
/// answer [`Response::Changed`] with `false` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Ping the daemon
    Ping,
    /// Query daemon status
    Status,
    /// Re-enumerate displays and return the detected set
    DetectMonitors,
    /// Read one monitor's slideshow settings
    GetMonitorConfig { monitor: String },
    /// Set a single key of a monitor's slideshow settings.
    ///
    /// Known keys: `images`, `interval`, `enabled`, `last_index`.
    UpdateMonitorConfig {
        monitor: String,
        key: String,
        value: Value,
    },
    /// Append one image path (duplicates are rejected)
    AddImage { monitor: String, path: String },
    /// Append every image found in files, directories or glob patterns
    AddImages { monitor: String, sources: Vec<String> },
    /// Remove one image path
    RemoveImage { monitor: String, path: String },
    /// Remove every image of a monitor
    ClearImages { monitor: String },
    /// Swap the image at `index` with its neighbour at `index + direction`
    MoveImage {
        monitor: String,
        index: usize,
        direction: i64,
    },
    /// Move the image at `src` to `dest`, shifting everything in between
    ShiftImage {
        monitor: String,
        src: usize,
        dest: usize,
    },
    /// Read global settings
    GetAppSettings,
    /// Set a global setting (`language` or `show_logs`)
    UpdateAppSetting { key: String, value: Value },
    /// Recomposite and reapply the wallpaper on the next tick
    Refresh,
    /// Stream status lines until the connection closes
    Subscribe,
    /// Stop the daemon
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Changed(bool),
    Error(SpanwallError),
    Pong,
    Status(DaemonStatus),
    Monitors(Vec<MonitorDescriptor>),
    MonitorConfig(MonitorSlideshowConfig),
    AppSettings(AppSettings),
    Log(String),
}

/// Daemon status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub monitors: Vec<MonitorDescriptor>,
    pub selections: Vec<SelectionStatus>,
}

/// Image currently shown on one monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionStatus {
    pub monitor: String,
    pub image: String,
}

/// IPC address helper
///
/// `SPANWALL_ADDR` overrides [`DEFAULT_ADDRESS`].
pub fn get_address() -> String {
    std::env::var("SPANWALL_ADDR").unwrap_or_else(|_| DEFAULT_ADDRESS.to_string())
}
