use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const LOW: u8 = 0x0;
pub const HIGH: u8 = 0x1;
pub const INPUT: u8 = 0x0;
pub const OUTPUT: u8 = 0x1;
pub const PULL_OFF: u8 = 0x0;
pub const PULL_DOWN: u8 = 0x1;
pub const PULL_UP: u8 = 0x2;
/// Falling edge.
pub const POLL_LOW: u8 = 0x1;
/// Rising edge.
pub const POLL_HIGH: u8 = 0x2;
pub const POLL_BOTH: u8 = POLL_LOW | POLL_HIGH;

/// Invoked with the pin number when a watched input changes to a level the
/// watcher's trigger accepts.
pub type PinCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Like [`PinCallback`], but also told the level that woke the watcher.
pub type LevelCallback = Arc<dyn Fn(u32, Level) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// File content used to persist this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }

    /// Parses the content of a pin file. Surrounding whitespace is tolerated
    /// so that files written by hand (`echo 1 > pin3`) still read back.
    pub fn parse(contents: &[u8]) -> Result<Self, AppError> {
        let text = std::str::from_utf8(contents)
            .map_err(|_| AppError::InvalidValue("pin file is not valid UTF-8".into()))?;
        let raw = text
            .trim()
            .parse::<u8>()
            .map_err(|_| AppError::InvalidValue(format!("pin file holds {text:?}")))?;
        Level::try_from(raw)
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => LOW,
            Level::High => HIGH,
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            LOW => Ok(Level::Low),
            HIGH => Ok(Level::High),
            _ => Err(AppError::InvalidValue("Value must be 0 or 1".into())),
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Direction {
    Input,
    Output,
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Input => INPUT,
            Direction::Output => OUTPUT,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            INPUT => Ok(Direction::Input),
            OUTPUT => Ok(Direction::Output),
            _ => Err(AppError::InvalidValue(
                "Direction must be 0 (input) or 1 (output)".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pull {
    #[default]
    Off,
    Down,
    Up,
}

impl TryFrom<u8> for Pull {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            PULL_OFF => Ok(Pull::Off),
            PULL_DOWN => Ok(Pull::Down),
            PULL_UP => Ok(Pull::Up),
            _ => Err(AppError::InvalidValue("Pull must be 0, 1 or 2".into())),
        }
    }
}

/// Which transitions wake a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Trigger {
    Low,
    High,
    #[default]
    Both,
}

impl Trigger {
    pub fn matches(&self, level: Level) -> bool {
        match (self, level) {
            (Trigger::Both, _) => true,
            (Trigger::High, Level::High) => true,
            (Trigger::Low, Level::Low) => true,
            _ => false,
        }
    }
}

impl From<Trigger> for u8 {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Low => POLL_LOW,
            Trigger::High => POLL_HIGH,
            Trigger::Both => POLL_BOTH,
        }
    }
}

impl TryFrom<u8> for Trigger {
    type Error = AppError;

    // 0 falls back to both edges, as an absent trigger does.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 | POLL_BOTH => Ok(Trigger::Both),
            POLL_LOW => Ok(Trigger::Low),
            POLL_HIGH => Ok(Trigger::High),
            _ => Err(AppError::InvalidValue("Trigger must be 1, 2 or 3".into())),
        }
    }
}

/// Extra argument of [`GpioSim::open`](crate::GpioSim::open).
///
/// Only the option matching the direction is honoured: a pull setting is
/// ignored on an output pin and an initial level is ignored on an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinOption {
    #[default]
    None,
    Pull(Pull),
    Initial(Level),
}

impl PinOption {
    /// Interprets a raw numeric option the way the constants overlap:
    /// `1` is `PULL_DOWN` for an input and `HIGH` for an output.
    pub fn from_raw(direction: Direction, raw: Option<u8>) -> Self {
        let Some(raw) = raw else {
            return PinOption::None;
        };
        match direction {
            Direction::Input => Pull::try_from(raw)
                .map(PinOption::Pull)
                .unwrap_or(PinOption::None),
            Direction::Output => Level::try_from(raw)
                .map(PinOption::Initial)
                .unwrap_or(PinOption::None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalResistor {
    pub pull_up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialState {
    pub high: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watcher {
    pub trigger: Trigger,
}

/// Registry entry of an open pin, serialized as-is into `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinConfig {
    pub input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_resistor: Option<InternalResistor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<InitialState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watcher: Option<Watcher>,
}

impl PinConfig {
    pub fn input(pull: Pull) -> Self {
        let internal_resistor = match pull {
            Pull::Off => None,
            Pull::Down => Some(InternalResistor { pull_up: false }),
            Pull::Up => Some(InternalResistor { pull_up: true }),
        };
        Self {
            input: true,
            internal_resistor,
            initial_state: None,
            watcher: None,
        }
    }

    pub fn output(initial: Option<Level>) -> Self {
        Self {
            input: false,
            internal_resistor: None,
            initial_state: initial.map(|level| InitialState {
                high: level == Level::High,
            }),
            watcher: None,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.input {
            Direction::Input
        } else {
            Direction::Output
        }
    }

    pub fn pull(&self) -> Pull {
        match self.internal_resistor {
            None => Pull::Off,
            Some(InternalResistor { pull_up: true }) => Pull::Up,
            Some(InternalResistor { pull_up: false }) => Pull::Down,
        }
    }
}
