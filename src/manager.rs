use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::{AppConfig, InitOptions};
use crate::error::AppError;
use crate::events::{EdgeEvent, EventCallbackHandler, EventHandler, dispatching_callback};
use crate::gpio::{Direction, Level, PinConfig, PinOption, Trigger};
use crate::sim::GpioSim;

/// Shares one [`GpioSim`] between HTTP workers. Watchers attached through the
/// manager publish their callbacks as [`EdgeEvent`]s.
pub struct GpioManager {
    sim: Mutex<GpioSim>,
    event_handler: EventHandler,
}

impl GpioManager {
    pub fn new(sim: GpioSim, broadcast_capacity: usize, event_history_capacity: usize) -> Self {
        Self {
            sim: Mutex::new(sim),
            event_handler: Arc::new(EventCallbackHandler::new(
                broadcast_capacity,
                event_history_capacity,
            )),
        }
    }

    /// Builds the device described by `config` and initializes it.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let mut sim = GpioSim::new(&config.device);
        sim.init(&InitOptions::default())?;
        Ok(Self::new(
            sim,
            config.broadcast_capacity,
            config.event_history_capacity,
        ))
    }

    pub async fn list_pins(&self) -> BTreeMap<u32, PinConfig> {
        self.sim.lock().snapshot()
    }

    pub async fn get_pin(&self, pin_id: u32) -> Result<PinConfig, AppError> {
        self.sim
            .lock()
            .pin_config(pin_id)
            .cloned()
            .ok_or(AppError::NotFoundPin(pin_id))
    }

    pub async fn open_pin(
        &self,
        pin_id: u32,
        direction: Direction,
        option: PinOption,
    ) -> Result<PinConfig, AppError> {
        let mut sim = self.sim.lock();
        sim.open(pin_id, direction, option)?;
        self.event_handler.clear(pin_id);
        sim.pin_config(pin_id)
            .cloned()
            .ok_or(AppError::NotFoundPin(pin_id))
    }

    pub async fn close_pin(&self, pin_id: u32) -> Result<(), AppError> {
        self.sim.lock().close(pin_id)?;
        self.event_handler.clear(pin_id);
        Ok(())
    }

    pub async fn close_all(&self) -> Result<(), AppError> {
        let mut sim = self.sim.lock();
        let pins: Vec<u32> = sim.snapshot().into_keys().collect();
        sim.close_all()?;
        for pin_id in pins {
            self.event_handler.clear(pin_id);
        }
        Ok(())
    }

    /// Re-initializes the device in place, keeping its root.
    pub async fn reset(&self) -> Result<(), AppError> {
        let mut sim = self.sim.lock();
        let pins: Vec<u32> = sim.snapshot().into_keys().collect();
        sim.init(&InitOptions::default())?;
        for pin_id in pins {
            self.event_handler.clear(pin_id);
        }
        Ok(())
    }

    pub async fn read_value(&self, pin_id: u32) -> Result<u8, AppError> {
        let level = self.sim.lock().read(pin_id)?;

        Ok(level.into())
    }

    pub async fn write_value(&self, pin_id: u32, value: u8) -> Result<(), AppError> {
        let level = Level::try_from(value)?;
        self.sim.lock().write(pin_id, level)
    }

    pub async fn set_watcher(
        &self,
        pin_id: u32,
        trigger: Option<Trigger>,
    ) -> Result<PinConfig, AppError> {
        let mut sim = self.sim.lock();
        let callback = dispatching_callback(self.event_handler.clone());
        sim.watch(pin_id, callback, trigger)?;
        sim.pin_config(pin_id)
            .cloned()
            .ok_or(AppError::NotFoundPin(pin_id))
    }

    pub async fn unset_watcher(&self, pin_id: u32) -> Result<(), AppError> {
        self.sim.lock().poll(pin_id, None, None)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EdgeEvent> {
        self.event_handler.subscribe()
    }

    pub async fn get_events(&self, pin_id: u32, limit: Option<usize>) -> Vec<EdgeEvent> {
        self.event_handler.events(pin_id, limit)
    }

    pub async fn get_last_event(&self, pin_id: u32) -> Option<EdgeEvent> {
        self.event_handler.last_event(pin_id)
    }
}
