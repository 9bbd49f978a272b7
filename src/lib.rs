mod backend;
mod config;
mod error;
mod events;
mod gpio;
mod manager;
mod routes;
mod sim;

pub use config::{AppConfig, DeviceConfig, HttpConfig, InitOptions};
pub use error::AppError;
pub use events::{EdgeEvent, EventCallbackHandler, EventHandler};
pub use gpio::{
    Direction, HIGH, INPUT, InitialState, InternalResistor, LOW, Level, OUTPUT, POLL_BOTH,
    POLL_HIGH, POLL_LOW, PULL_DOWN, PULL_OFF, PULL_UP, LevelCallback, PinCallback, PinConfig, PinOption, Pull,
    Trigger, Watcher,
};
pub use manager::GpioManager;
pub use routes::AppState;
pub use sim::GpioSim;
