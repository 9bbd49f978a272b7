use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::backend::{Area, EdgePoller, PinStorage};
use crate::config::{DEFAULT_ROOT_DIR, DeviceConfig, InitOptions};
use crate::error::AppError;
use crate::gpio::{
    Direction, Level, LevelCallback, PinCallback, PinConfig, PinOption, Pull, Trigger, Watcher,
};

/// A simulated GPIO device backed by a directory tree.
///
/// The device is owned by one caller and every mutating operation takes
/// `&mut self`. Pollers run on their own threads and only touch their pin
/// file, so several devices (each with its own root) can live in one process.
///
/// Call [`init`](Self::init) before anything else: it creates the directory
/// layout the other operations rely on.
pub struct GpioSim {
    storage: PinStorage,
    poll_interval: Duration,
    pins: FxHashMap<u32, PinConfig>,
    pollers: FxHashMap<u32, EdgePoller>,
}

impl Default for GpioSim {
    fn default() -> Self {
        Self::new(&DeviceConfig::default())
    }
}

impl GpioSim {
    pub fn new(config: &DeviceConfig) -> Self {
        let root = config
            .mock_root_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_DIR));
        Self {
            storage: PinStorage::new(root),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            pins: FxHashMap::default(),
            pollers: FxHashMap::default(),
        }
    }

    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    pub fn input_path(&self, pin: u32) -> PathBuf {
        self.storage.pin_path(Area::Input, pin)
    }

    pub fn output_path(&self, pin: u32) -> PathBuf {
        self.storage.pin_path(Area::Output, pin)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.storage.meta_path()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resets the device to an empty state, optionally moving it to a new
    /// root. The root chosen here is kept for later calls that omit one.
    pub fn init(&mut self, options: &InitOptions) -> Result<(), AppError> {
        self.pollers.clear();
        self.pins.clear();
        if let Some(root) = &options.mock_root_dir {
            self.storage.set_root(root.clone());
        }
        self.storage.reset()?;
        info!("Simulated GPIO device ready at {}", self.root().display());
        self.export_snapshot()
    }

    /// Configures `pin`, replacing any previous configuration and watcher.
    pub fn open(
        &mut self,
        pin: u32,
        direction: Direction,
        option: PinOption,
    ) -> Result<(), AppError> {
        self.close(pin)?;

        let config = match direction {
            Direction::Input => {
                let pull = match option {
                    PinOption::Pull(pull) => pull,
                    _ => Pull::Off,
                };
                self.storage.write_level(Area::Input, pin, Level::Low)?;
                PinConfig::input(pull)
            }
            Direction::Output => {
                let initial = match option {
                    PinOption::Initial(level) => Some(level),
                    _ => None,
                };
                let level = initial.unwrap_or(Level::Low);
                self.storage.write_level(Area::Output, pin, level)?;
                PinConfig::output(initial)
            }
        };

        debug!("Opened pin {pin} as {direction:?}");
        self.pins.insert(pin, config);
        self.export_snapshot()
    }

    /// Sets the output file of `pin`. The registry is not consulted, so this
    /// also creates an output file for a pin that was never opened.
    pub fn write(&self, pin: u32, level: Level) -> Result<(), AppError> {
        self.storage.write_level(Area::Output, pin, level)
    }

    /// Reads the input file of `pin`. Fails with [`AppError::NotFoundPin`]
    /// when there is none.
    pub fn read(&self, pin: u32) -> Result<Level, AppError> {
        self.storage.read_level(Area::Input, pin)
    }

    /// Attaches (`Some`) or detaches (`None`) a watcher on an input pin.
    ///
    /// Attaching replaces any existing watcher and starts from an unknown
    /// level, so the first change observed afterwards can fire. A missing
    /// trigger means both edges.
    pub fn poll(
        &mut self,
        pin: u32,
        callback: Option<PinCallback>,
        trigger: Option<Trigger>,
    ) -> Result<(), AppError> {
        match callback {
            Some(callback) => {
                let callback: LevelCallback = Arc::new(move |pin, _level: Level| callback(pin));
                self.watch(pin, callback, trigger)
            }
            None => {
                self.detach(pin);
                self.export_snapshot()
            }
        }
    }

    /// Attaches a watcher whose callback also receives the level it fired on.
    /// Otherwise behaves as [`poll`](Self::poll) with a callback.
    pub fn watch(
        &mut self,
        pin: u32,
        callback: LevelCallback,
        trigger: Option<Trigger>,
    ) -> Result<(), AppError> {
        if !self.pins.contains_key(&pin) {
            return Err(AppError::NotFoundPin(pin));
        }
        let trigger = trigger.unwrap_or_default();

        // stop the old thread before the new one takes its first sample
        self.detach(pin);
        let spawned = EdgePoller::spawn(
            pin,
            self.input_path(pin),
            self.poll_interval,
            trigger,
            callback,
        );
        let poller = match spawned {
            Ok(poller) => poller,
            Err(e) => {
                self.export_snapshot()?;
                return Err(e);
            }
        };
        self.pollers.insert(pin, poller);

        if let Some(config) = self.pins.get_mut(&pin) {
            config.watcher = Some(Watcher { trigger });
        }
        debug!("Watching pin {pin} with trigger {}", u8::from(trigger));
        self.export_snapshot()
    }

    fn detach(&mut self, pin: u32) {
        if self.pollers.remove(&pin).is_some() {
            debug!("Stopped watching pin {pin}");
        }
        if let Some(config) = self.pins.get_mut(&pin) {
            config.watcher = None;
        }
    }

    /// Tears `pin` down. Closing a pin that is not open is a no-op apart from
    /// rewriting the snapshot.
    ///
    /// The pin leaves the registry even when its files cannot be removed; the
    /// storage error is returned after the snapshot is rewritten.
    pub fn close(&mut self, pin: u32) -> Result<(), AppError> {
        self.detach(pin);
        if self.pins.remove(&pin).is_some() {
            debug!("Closed pin {pin}");
        }
        let removed = self.storage.remove(pin);
        self.export_snapshot()?;
        removed
    }

    pub fn close_all(&mut self) -> Result<(), AppError> {
        let pins: Vec<u32> = self.pins.keys().copied().collect();
        for pin in pins {
            self.close(pin)?;
        }
        Ok(())
    }

    pub fn pin_config(&self, pin: u32) -> Option<&PinConfig> {
        self.pins.get(&pin)
    }

    pub fn is_watched(&self, pin: u32) -> bool {
        self.pollers.contains_key(&pin)
    }

    /// Copy of the registry, ordered by pin number.
    pub fn snapshot(&self) -> BTreeMap<u32, PinConfig> {
        self.pins
            .iter()
            .map(|(pin, config)| (*pin, config.clone()))
            .collect()
    }

    /// Writes the registry to `meta.json` for outside inspection.
    pub fn export_snapshot(&self) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| AppError::Snapshot(format!("serialize registry: {e}")))?;
        self.storage.write_meta(&json)
    }
}
