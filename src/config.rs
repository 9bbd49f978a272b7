use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_ROOT_DIR: &str = "/tmp/gpio";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
    pub timeout: u64,
}

/// Settings of the simulated device itself.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    #[serde(default, alias = "mockRootDir")]
    pub mock_root_dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mock_root_dir: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Options accepted by [`GpioSim::init`](crate::GpioSim::init).
///
/// A missing `mock_root_dir` keeps whatever root the device used last.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct InitOptions {
    #[serde(default, alias = "mockRootDir")]
    pub mock_root_dir: Option<PathBuf>,
}

impl InitOptions {
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            mock_root_dir: Some(root.into()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    pub broadcast_capacity: usize,
    pub event_history_capacity: usize,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))
    }
}
