use common::{MonitorDescriptor, MonitorSlideshowConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use crate::DaemonState;
use crate::applier;
use crate::compositor::Compositor;
use crate::config::ConfigStore;

/// Cadence of the slideshow loop
pub const TICK: Duration = Duration::from_secs(1);

/// Where a monitor stands relative to its next rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// Disabled or no images
    Idle,
    /// Showing an image, waiting for the interval to elapse
    Armed,
    /// Needs a new selection on this tick
    Due,
}

/// Per-monitor rotation timers and the current selection map.
///
/// Timers only live in memory. `last_index` in the store is the single
/// persisted piece of rotation state.
#[derive(Debug, Default)]
pub struct SlideshowScheduler {
    /// Last time each monitor rotated or was first populated
    last_check: HashMap<String, Instant>,

    /// Image currently shown on each monitor
    selections: BTreeMap<String, String>,

    /// Recomposite on the next tick even if nothing rotates
    pending_refresh: bool,
}

impl SlideshowScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a monitor at `now`
    pub fn state(&self, name: &str, cfg: &MonitorSlideshowConfig, now: Instant) -> RotationState {
        if !cfg.is_active() {
            return RotationState::Idle;
        }

        let Some(last) = self.populated_at(name, cfg) else {
            return RotationState::Due;
        };

        let interval = Duration::from_secs(cfg.interval_seconds.max(1));
        if now.saturating_duration_since(last) >= interval {
            RotationState::Due
        } else {
            RotationState::Armed
        }
    }

    /// Run one scheduling pass.
    ///
    /// Returns the selection map to composite when at least one monitor
    /// rotated (or was shown for the first time), or a refresh was forced.
    /// The map covers every active monitor, not just the ones that changed.
    pub fn tick(
        &mut self,
        now: Instant,
        monitors: &[MonitorDescriptor],
        store: &ConfigStore,
    ) -> Option<BTreeMap<String, String>> {
        let mut changed = false;

        for monitor in monitors {
            let name = monitor.name.as_str();
            let cfg = store.get_monitor_config(name);

            if self.state(name, &cfg, now) != RotationState::Due {
                continue;
            }

            if self.populated_at(name, &cfg).is_none() {
                // First population: show the persisted position without advancing
                let Some(image) = cfg.current_image() else {
                    continue;
                };
                log::debug!("{}: initial image {}", name, image);
                self.selections.insert(name.to_string(), image.to_string());
                self.last_check.insert(name.to_string(), now);
                changed = true;
            } else if let Some((index, image)) = store.advance_index(name) {
                log::debug!("{}: rotated to #{} {}", name, index, image);
                self.selections.insert(name.to_string(), image);
                self.last_check.insert(name.to_string(), now);
                changed = true;
            }
        }

        let active = self.active_selections(monitors, store);
        let refresh = std::mem::take(&mut self.pending_refresh) && !active.is_empty();

        (changed || refresh).then_some(active)
    }

    /// Make the next tick recomposite
    pub fn force_recomposite(&mut self) {
        self.pending_refresh = true;
    }

    pub fn selections(&self) -> &BTreeMap<String, String> {
        &self.selections
    }

    /// When `name` was last populated, if its selection is still one of its
    /// images. A selection that fell out of the list counts as unpopulated.
    fn populated_at(&self, name: &str, cfg: &MonitorSlideshowConfig) -> Option<Instant> {
        let selected = self.selections.get(name)?;
        if !cfg.images.contains(selected) {
            return None;
        }
        self.last_check.get(name).copied()
    }

    /// Selections of every monitor that is enabled and has images.
    ///
    /// Disabled monitors keep their entry in `selections` so they resume
    /// where they stopped, but they don't occupy a canvas region.
    fn active_selections(
        &self,
        monitors: &[MonitorDescriptor],
        store: &ConfigStore,
    ) -> BTreeMap<String, String> {
        monitors
            .iter()
            .filter(|m| store.get_monitor_config(&m.name).is_active())
            .filter_map(|m| {
                self.selections
                    .get(&m.name)
                    .map(|image| (m.name.clone(), image.clone()))
            })
            .collect()
    }
}

/// Composite and apply when the scheduler reports a change
fn run_tick(scheduler: &mut SlideshowScheduler, state: &DaemonState, compositor: &Compositor) {
    let monitors = state.topology.monitors();
    let selections = some_or_return!(
        scheduler.tick(Instant::now(), &monitors, &state.store),
        "Nothing due"
    );

    state.publish_selections(selections.clone());

    match compositor.composite(&monitors, &selections, &state.status) {
        Ok(path) => {
            report_and_continue!(
                state.status,
                applier::apply(state.topology.desktop(), &path, &state.status),
                "apply wallpaper"
            );
        }
        Err(e) => state.status.emit(format!("Error creating stitched wallpaper: {}", e)),
    }
}

/// Drive the slideshow until shutdown is requested.
///
/// Ticks never overlap: the next one is scheduled only after the blocking
/// composite/apply work of the current one has finished.
pub async fn run(state: Arc<DaemonState>, compositor: Arc<Compositor>) {
    let mut scheduler = SlideshowScheduler::new();
    let mut shutdown = state.subscribe_shutdown();

    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!("Slideshow scheduler started ({}s tick)", TICK.as_secs());

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = state.refresh_requested() => {
                log::debug!("Refresh requested");
                scheduler.force_recomposite();
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if state.is_shutting_down() {
            break;
        }

        let tick_state = state.clone();
        let tick_compositor = compositor.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_tick(&mut scheduler, &tick_state, &tick_compositor);
            scheduler
        })
        .await;

        scheduler = match result {
            Ok(scheduler) => scheduler,
            Err(e) => {
                log::error!("Slideshow tick failed: {}", e);
                SlideshowScheduler::new()
            }
        };
    }

    log::info!("Slideshow scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusLog;
    use serde_json::json;

    fn monitor(name: &str, x: i32) -> MonitorDescriptor {
        MonitorDescriptor {
            name: name.to_string(),
            x,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }

    fn new_store(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::open(
            dir.path().join("config.json"),
            Arc::new(StatusLog::default()),
        )
    }

    /// Register `name` as an enabled slideshow
    fn configure(store: &ConfigStore, name: &str, images: &[&str], interval: u64) {
        store.ensure_monitors([name]);
        store
            .update_monitor_config(name, "images", json!(images))
            .unwrap();
        store
            .update_monitor_config(name, "interval", json!(interval))
            .unwrap();
        store
            .update_monitor_config(name, "enabled", json!(true))
            .unwrap();
    }

    #[test]
    fn test_first_population_does_not_advance() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a.png", "b.png"], 10);
        let monitors = [monitor("A", 0)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        let selections = scheduler.tick(t0, &monitors, &store).unwrap();

        assert_eq!(selections["A"], "a.png");
        assert_eq!(store.get_monitor_config("A").last_index, 0);
    }

    #[test]
    fn test_first_population_resumes_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a.png", "b.png", "c.png"], 10);
        store
            .update_monitor_config("A", "last_index", json!(5))
            .unwrap();
        let mut scheduler = SlideshowScheduler::new();

        let selections = scheduler
            .tick(Instant::now(), &[monitor("A", 0)], &store)
            .unwrap();

        // 5 mod 3
        assert_eq!(selections["A"], "c.png");
    }

    #[test]
    fn test_rotation_cycles_and_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a.png", "b.png", "c.png"], 10);
        let monitors = [monitor("A", 0)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        assert_eq!(scheduler.tick(t0, &monitors, &store).unwrap()["A"], "a.png");

        let mut seen = Vec::new();
        for step in 1..=3 {
            let now = t0 + Duration::from_secs(10 * step);
            let selections = scheduler.tick(now, &monitors, &store).unwrap();
            seen.push(selections["A"].clone());

            let cfg = store.get_monitor_config("A");
            assert!(cfg.last_index < cfg.images.len());
        }

        assert_eq!(seen, vec!["b.png", "c.png", "a.png"]);
        assert_eq!(store.get_monitor_config("A").last_index, 0);
    }

    #[test]
    fn test_no_change_before_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a.png", "b.png"], 10);
        let monitors = [monitor("A", 0)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        scheduler.tick(t0, &monitors, &store).unwrap();

        let cfg = store.get_monitor_config("A");
        assert_eq!(
            scheduler.state("A", &cfg, t0 + Duration::from_secs(9)),
            RotationState::Armed
        );
        assert!(
            scheduler
                .tick(t0 + Duration::from_secs(9), &monitors, &store)
                .is_none()
        );
        assert_eq!(store.get_monitor_config("A").last_index, 0);
    }

    #[test]
    fn test_disabled_monitor_freezes() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a.png", "b.png"], 10);
        let monitors = [monitor("A", 0)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        scheduler.tick(t0, &monitors, &store).unwrap();
        store
            .update_monitor_config("A", "enabled", json!(false))
            .unwrap();

        for step in 1..=5 {
            let now = t0 + Duration::from_secs(10 * step);
            assert!(scheduler.tick(now, &monitors, &store).is_none());
        }

        assert_eq!(store.get_monitor_config("A").last_index, 0);
        assert_eq!(scheduler.selections()["A"], "a.png");
        assert_eq!(
            scheduler.state("A", &store.get_monitor_config("A"), t0),
            RotationState::Idle
        );
    }

    #[test]
    fn test_empty_monitor_is_never_due() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &[], 10);
        let monitors = [monitor("A", 0)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        for step in 0..3 {
            let now = t0 + Duration::from_secs(100 * step);
            assert_eq!(
                scheduler.state("A", &store.get_monitor_config("A"), now),
                RotationState::Idle
            );
            assert!(scheduler.tick(now, &monitors, &store).is_none());
        }
        assert!(scheduler.selections().is_empty());
    }

    #[test]
    fn test_recomposite_includes_every_active_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a1.png", "a2.png"], 10);
        configure(&store, "B", &["b1.png", "b2.png"], 100);
        let monitors = [monitor("A", 0), monitor("B", 1920)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        scheduler.tick(t0, &monitors, &store).unwrap();

        // Only A is due, B keeps its image but is still part of the canvas
        let selections = scheduler
            .tick(t0 + Duration::from_secs(10), &monitors, &store)
            .unwrap();

        assert_eq!(selections.len(), 2);
        assert_eq!(selections["A"], "a2.png");
        assert_eq!(selections["B"], "b1.png");
        assert_eq!(store.get_monitor_config("B").last_index, 0);
    }

    #[test]
    fn test_disabled_monitor_left_out_of_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a1.png", "a2.png"], 10);
        configure(&store, "B", &["b1.png"], 10);
        let monitors = [monitor("A", 0), monitor("B", 1920)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        scheduler.tick(t0, &monitors, &store).unwrap();
        store
            .update_monitor_config("B", "enabled", json!(false))
            .unwrap();

        let selections = scheduler
            .tick(t0 + Duration::from_secs(10), &monitors, &store)
            .unwrap();

        assert_eq!(selections.keys().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn test_forced_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a.png", "b.png"], 10);
        let monitors = [monitor("A", 0)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        scheduler.tick(t0, &monitors, &store).unwrap();
        assert!(scheduler.tick(t0, &monitors, &store).is_none());

        scheduler.force_recomposite();
        let selections = scheduler.tick(t0, &monitors, &store).unwrap();
        assert_eq!(selections["A"], "a.png");
        assert_eq!(store.get_monitor_config("A").last_index, 0);

        // One-shot
        assert!(scheduler.tick(t0, &monitors, &store).is_none());
    }

    #[test]
    fn test_refresh_without_active_monitors_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &[], 10);
        let mut scheduler = SlideshowScheduler::new();

        scheduler.force_recomposite();
        assert!(
            scheduler
                .tick(Instant::now(), &[monitor("A", 0)], &store)
                .is_none()
        );
    }

    #[test]
    fn test_replaced_image_list_repopulates() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        configure(&store, "A", &["a.png", "b.png"], 10);
        let monitors = [monitor("A", 0)];
        let mut scheduler = SlideshowScheduler::new();
        let t0 = Instant::now();

        scheduler.tick(t0, &monitors, &store).unwrap();
        store
            .update_monitor_config("A", "images", json!(["x.png", "y.png"]))
            .unwrap();

        let selections = scheduler
            .tick(t0 + Duration::from_secs(1), &monitors, &store)
            .unwrap();
        assert_eq!(selections["A"], "x.png");
    }
}
