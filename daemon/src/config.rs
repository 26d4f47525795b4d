use anyhow::{Context, Result};
use common::{AppSettings, Language, MonitorSlideshowConfig, SpanwallError};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::status::StatusLog;

pub const CONFIG_FILE_NAME: &str = "monitor_config.json";

const APP_SETTINGS_KEY: &str = "app_settings";

/// The persisted configuration document.
///
/// On disk this is a single JSON object: the `app_settings` record plus one
/// record per monitor name. Top-level entries that are not valid monitor
/// records are carried in `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    pub app_settings: AppSettings,
    pub monitors: BTreeMap<String, MonitorSlideshowConfig>,
    pub extra: Map<String, Value>,
}

impl ConfigDocument {
    fn from_map(mut map: Map<String, Value>) -> Self {
        let app_settings = match map.remove(APP_SETTINGS_KEY) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                log::warn!("Invalid app_settings ({}), using defaults", e);
                AppSettings::default()
            }),
            None => AppSettings::default(),
        };

        let mut monitors = BTreeMap::new();
        let mut extra = Map::new();

        for (key, value) in map {
            match value {
                Value::Object(record) if is_monitor_record(&record) => {
                    let cfg = read_monitor_record(&key, record);
                    monitors.insert(key, cfg);
                }
                value => {
                    log::debug!("Keeping unrecognised config entry '{}' as-is", key);
                    extra.insert(key, value);
                }
            }
        }

        Self {
            app_settings,
            monitors,
            extra,
        }
    }
}

const RECORD_KEYS: [&str; 4] = ["images", "interval", "enabled", "last_index"];

/// An object is a monitor record once it carries any of the record keys.
/// Other top-level objects belong to someone else and stay untouched.
fn is_monitor_record(record: &Map<String, Value>) -> bool {
    RECORD_KEYS.iter().any(|key| record.contains_key(*key))
}

/// Read a monitor record field by field.
///
/// A field of the wrong type falls back to its default with a warning, so
/// one bad value never costs the rest of the record (the image list above
/// all). Keys outside the record schema go to `extra`.
fn read_monitor_record(name: &str, mut record: Map<String, Value>) -> MonitorSlideshowConfig {
    let mut cfg = MonitorSlideshowConfig::default();

    if let Some(value) = record.remove("images") {
        match value {
            Value::Array(items) => {
                let total = items.len();
                cfg.images = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(path) => Some(path),
                        _ => None,
                    })
                    .collect();
                if cfg.images.len() != total {
                    log::warn!(
                        "{}: dropped {} image entries that are not paths",
                        name,
                        total - cfg.images.len()
                    );
                }
            }
            other => log::warn!("{}: ignoring images {}, expected an array of paths", name, other),
        }
    }

    if let Some(value) = record.remove("interval") {
        match read_interval(&value) {
            Some(secs) => cfg.interval_seconds = secs,
            None => log::warn!(
                "{}: ignoring interval {}, using {}s",
                name,
                value,
                cfg.interval_seconds
            ),
        }
    }

    if let Some(value) = record.remove("enabled") {
        match value.as_bool() {
            Some(enabled) => cfg.enabled = enabled,
            None => log::warn!("{}: ignoring enabled {}, slideshow stays off", name, value),
        }
    }

    if let Some(value) = record.remove("last_index") {
        match value.as_u64().and_then(|i| usize::try_from(i).ok()) {
            Some(index) => cfg.last_index = index,
            None => log::warn!("{}: ignoring last_index {}, starting from 0", name, value),
        }
    }

    cfg.extra = record;
    cfg
}

/// Positive whole seconds. Whole-valued floats such as `30.0` are accepted.
fn read_interval(value: &Value) -> Option<u64> {
    if let Some(secs) = value.as_u64() {
        return (secs > 0).then_some(secs);
    }
    let secs = value.as_f64()?;
    (secs.is_finite() && secs >= 1.0 && secs.fract() == 0.0 && secs <= u64::MAX as f64)
        .then_some(secs as u64)
}

impl Serialize for ConfigDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.monitors.len() + self.extra.len()))?;
        map.serialize_entry(APP_SETTINGS_KEY, &self.app_settings)?;
        for (name, cfg) in &self.monitors {
            map.serialize_entry(name, cfg)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConfigDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_map(map))
    }
}

/// A validated change to one key of a monitor record
#[derive(Debug, Clone, PartialEq)]
enum MonitorUpdate {
    Images(Vec<String>),
    Interval(u64),
    Enabled(bool),
    LastIndex(usize),
    Other(String, Value),
}

impl MonitorUpdate {
    fn parse(key: &str, value: Value) -> Result<Self, SpanwallError> {
        let invalid = |reason: &str| SpanwallError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        match key {
            "images" => serde_json::from_value(value)
                .map(Self::Images)
                .map_err(|_| invalid("expected an array of paths")),
            "interval" | "interval_seconds" => match value.as_u64() {
                Some(secs) if secs > 0 => Ok(Self::Interval(secs)),
                _ => Err(invalid("expected a positive number of seconds")),
            },
            "enabled" => value
                .as_bool()
                .map(Self::Enabled)
                .ok_or_else(|| invalid("expected true or false")),
            "last_index" => value
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .map(Self::LastIndex)
                .ok_or_else(|| invalid("expected a non-negative index")),
            _ => Ok(Self::Other(key.to_string(), value)),
        }
    }

    fn apply(self, cfg: &mut MonitorSlideshowConfig) {
        match self {
            Self::Images(images) => cfg.images = images,
            Self::Interval(secs) => cfg.interval_seconds = secs,
            Self::Enabled(enabled) => cfg.enabled = enabled,
            Self::LastIndex(index) => cfg.last_index = index,
            Self::Other(key, value) => {
                cfg.extra.insert(key, value);
            }
        }
    }
}

/// A validated change to one global setting
#[derive(Debug, Clone, PartialEq)]
enum AppUpdate {
    Language(Language),
    ShowLogs(bool),
    Other(String, Value),
}

impl AppUpdate {
    fn parse(key: &str, value: Value) -> Result<Self, SpanwallError> {
        match key {
            "language" => value
                .as_str()
                .ok_or_else(|| SpanwallError::InvalidValue {
                    key: key.to_string(),
                    reason: "expected tr or en".to_string(),
                })?
                .parse()
                .map(Self::Language),
            "show_logs" => value
                .as_bool()
                .map(Self::ShowLogs)
                .ok_or_else(|| SpanwallError::InvalidValue {
                    key: key.to_string(),
                    reason: "expected true or false".to_string(),
                }),
            _ => Ok(Self::Other(key.to_string(), value)),
        }
    }

    fn apply(self, settings: &mut AppSettings) {
        match self {
            Self::Language(language) => settings.language = language,
            Self::ShowLogs(show) => settings.show_logs = show,
            Self::Other(key, value) => {
                settings.extra.insert(key, value);
            }
        }
    }
}

/// Mutex-guarded configuration document backed by one JSON file.
///
/// Every mutating call persists the full document before it returns, while
/// still holding the lock, so concurrent callers never lose each other's
/// updates.
pub struct ConfigStore {
    path: PathBuf,
    doc: Mutex<ConfigDocument>,
    status: Arc<StatusLog>,
}

impl ConfigStore {
    /// Open the store at `path`, falling back to an empty document when the
    /// file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>, status: Arc<StatusLog>) -> Self {
        let path = path.into();
        let doc = Self::load_from_path(&path).unwrap_or_else(|e| {
            log::error!("{}. Starting from an empty configuration.", e);
            ConfigDocument::default()
        });

        status.set_enabled(doc.app_settings.show_logs);

        Self {
            path,
            doc: Mutex::new(doc),
            status,
        }
    }

    /// Read a document from disk
    pub fn load_from_path(path: &Path) -> Result<ConfigDocument, SpanwallError> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(ConfigDocument::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| config_io(path, e))?;
        let doc = serde_json::from_str(&contents).map_err(|e| config_io(path, e))?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(doc)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("spanwall");

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the document from disk without touching the in-memory copy
    pub fn load(&self) -> Result<ConfigDocument, SpanwallError> {
        Self::load_from_path(&self.path)
    }

    /// Replace the whole document and persist it
    pub fn save(&self, doc: ConfigDocument) -> Result<(), SpanwallError> {
        let mut current = self.lock();
        write_document(&self.path, &doc)?;
        self.status.set_enabled(doc.app_settings.show_logs);
        *current = doc;
        Ok(())
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> ConfigDocument {
        self.lock().clone()
    }

    /// Settings for `name`, or a default record for an unknown monitor
    pub fn get_monitor_config(&self, name: &str) -> MonitorSlideshowConfig {
        self.lock().monitors.get(name).cloned().unwrap_or_default()
    }

    pub fn get_app_settings(&self) -> AppSettings {
        self.lock().app_settings.clone()
    }

    /// Create default records for monitors seen for the first time.
    ///
    /// Returns the names that were added.
    pub fn ensure_monitors<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut added = Vec::new();
        self.mutate(|doc| {
            for name in names {
                if doc.monitors.contains_key(name) {
                    continue;
                }
                let cfg = match doc.extra.remove(name) {
                    Some(Value::Object(record)) => read_monitor_record(name, record),
                    Some(other) => {
                        log::warn!("Replacing unreadable config entry for monitor {}: {}", name, other);
                        MonitorSlideshowConfig::default()
                    }
                    None => MonitorSlideshowConfig::default(),
                };
                doc.monitors.insert(name.to_string(), cfg);
                added.push(name.to_string());
            }
            !added.is_empty()
        });
        added
    }

    /// Set one key of a monitor record.
    ///
    /// Returns `Ok(false)` when the monitor is unknown.
    pub fn update_monitor_config(
        &self,
        name: &str,
        key: &str,
        value: Value,
    ) -> Result<bool, SpanwallError> {
        let shown = value.to_string();
        let update = MonitorUpdate::parse(key, value)?;

        let changed = self.mutate(|doc| match doc.monitors.get_mut(name) {
            Some(cfg) => {
                update.apply(cfg);
                true
            }
            None => false,
        });

        if changed {
            self.status
                .emit(format!("Updated {}: {} -> {}", name, key, shown));
        }
        Ok(changed)
    }

    /// Set one global setting
    pub fn update_app_setting(&self, key: &str, value: Value) -> Result<(), SpanwallError> {
        let shown = value.to_string();
        let update = AppUpdate::parse(key, value)?;

        let show_logs = self.mutate_with(|doc| {
            update.apply(&mut doc.app_settings);
            Some(doc.app_settings.show_logs)
        });

        if let Some(show) = show_logs {
            self.status.set_enabled(show);
        }
        self.status
            .emit(format!("App setting updated: {} = {}", key, shown));
        Ok(())
    }

    /// Append `path` unless it is already in the list
    pub fn add_image(&self, name: &str, path: &str) -> bool {
        let added = self.mutate(|doc| match doc.monitors.get_mut(name) {
            Some(cfg) if !cfg.images.iter().any(|p| p == path) => {
                cfg.images.push(path.to_string());
                true
            }
            _ => false,
        });

        if added {
            self.status.emit(format!("Added image to {}", name));
        }
        added
    }

    /// Append several paths with a single persist, skipping duplicates.
    ///
    /// Returns how many were added.
    pub fn add_images(&self, name: &str, paths: &[String]) -> usize {
        let count = self
            .mutate_with(|doc| {
                let cfg = doc.monitors.get_mut(name)?;
                let mut count = 0;
                for path in paths {
                    if !cfg.images.contains(path) {
                        cfg.images.push(path.clone());
                        count += 1;
                    }
                }
                (count > 0).then_some(count)
            })
            .unwrap_or(0);

        if count > 0 {
            self.status
                .emit(format!("Added {} images to {}", count, name));
        }
        count
    }

    pub fn remove_image(&self, name: &str, path: &str) -> bool {
        let removed = self.mutate(|doc| {
            let Some(cfg) = doc.monitors.get_mut(name) else {
                return false;
            };
            match cfg.images.iter().position(|p| p == path) {
                Some(index) => {
                    cfg.images.remove(index);
                    true
                }
                None => false,
            }
        });

        if removed {
            self.status.emit(format!("Removed image from {}", name));
        }
        removed
    }

    pub fn clear_images(&self, name: &str) -> bool {
        let cleared = self.mutate(|doc| match doc.monitors.get_mut(name) {
            Some(cfg) => {
                cfg.images.clear();
                true
            }
            None => false,
        });

        if cleared {
            self.status.emit(format!("Cleared images of {}", name));
        }
        cleared
    }

    /// Swap the image at `index` with the one at `index + direction`
    pub fn move_image(&self, name: &str, index: usize, direction: i64) -> bool {
        let moved = self.mutate(|doc| {
            let Some(cfg) = doc.monitors.get_mut(name) else {
                return false;
            };
            let len = cfg.images.len();
            let target = i64::try_from(index)
                .ok()
                .and_then(|i| i.checked_add(direction))
                .and_then(|t| usize::try_from(t).ok());

            match target {
                Some(target) if index < len && target < len => {
                    cfg.images.swap(index, target);
                    true
                }
                _ => false,
            }
        });

        if moved {
            self.status.emit(format!("Reordered images in {}", name));
        }
        moved
    }

    /// Remove the image at `src` and reinsert it at `dest`
    pub fn shift_image(&self, name: &str, src: usize, dest: usize) -> bool {
        let shifted = self.mutate(|doc| {
            let Some(cfg) = doc.monitors.get_mut(name) else {
                return false;
            };
            let len = cfg.images.len();
            if src >= len || dest >= len {
                return false;
            }
            let item = cfg.images.remove(src);
            cfg.images.insert(dest, item);
            true
        });

        if shifted {
            self.status
                .emit(format!("Moved image {} -> {} on {}", src, dest, name));
        }
        shifted
    }

    /// Advance an active monitor to its next image.
    ///
    /// Returns the new index and path, or `None` when the monitor is unknown,
    /// disabled or has no images.
    pub fn advance_index(&self, name: &str) -> Option<(usize, String)> {
        self.mutate_with(|doc| {
            let cfg = doc.monitors.get_mut(name)?;
            if !cfg.is_active() {
                return None;
            }
            let next = cfg.next_index()?;
            cfg.last_index = next;
            Some((next, cfg.images[next].clone()))
        })
    }

    fn lock(&self) -> MutexGuard<'_, ConfigDocument> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock and persist when it reports a change
    fn mutate(&self, f: impl FnOnce(&mut ConfigDocument) -> bool) -> bool {
        self.mutate_with(|doc| f(doc).then_some(())).is_some()
    }

    /// Run `f` under the lock and persist when it returns `Some`
    fn mutate_with<T>(&self, f: impl FnOnce(&mut ConfigDocument) -> Option<T>) -> Option<T> {
        let mut doc = self.lock();
        let result = f(&mut doc)?;

        if let Err(e) = write_document(&self.path, &doc) {
            log::error!("Config save error: {}", e);
        }
        Some(result)
    }
}

fn config_io(path: &Path, e: impl std::fmt::Display) -> SpanwallError {
    SpanwallError::ConfigIo(format!("{}: {}", path.display(), e))
}

/// Write the whole document next to `path` and move it into place
fn write_document(path: &Path, doc: &ConfigDocument) -> Result<(), SpanwallError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| config_io(path, e))?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| config_io(path, e))?;
    serde_json::to_writer_pretty(&mut file, doc).map_err(|e| config_io(path, e))?;
    file.write_all(b"\n").map_err(|e| config_io(path, e))?;
    file.persist(path).map_err(|e| config_io(path, e.error))?;

    Ok(())
}
