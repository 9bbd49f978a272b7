use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::AppError;
use crate::gpio::Level;

const INPUT_DIR: &str = "in";
const OUTPUT_DIR: &str = "out";
const META_FILE: &str = "meta.json";

/// Which half of the simulated device a pin file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Input,
    Output,
}

impl Area {
    fn dir_name(&self) -> &'static str {
        match self {
            Area::Input => INPUT_DIR,
            Area::Output => OUTPUT_DIR,
        }
    }
}

/// Filesystem layout of a simulated device:
///
/// ```text
/// <root>/in/pin<N>    inputs, written by whoever simulates the hardware
/// <root>/out/pin<N>   outputs, written by the program under test
/// <root>/meta.json    registry snapshot
/// ```
#[derive(Debug, Clone)]
pub struct PinStorage {
    root: PathBuf,
}

impl PinStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_root<P: Into<PathBuf>>(&mut self, root: P) {
        self.root = root.into();
    }

    pub fn pin_path(&self, area: Area, pin: u32) -> PathBuf {
        self.root.join(area.dir_name()).join(format!("pin{pin}"))
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    /// Wipes the root and recreates the empty `in` and `out` areas.
    pub fn reset(&self) -> Result<(), AppError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "remove {}: {e}",
                    self.root.display()
                )));
            }
        }
        for area in [Area::Input, Area::Output] {
            let dir = self.root.join(area.dir_name());
            fs::create_dir_all(&dir)
                .map_err(|e| AppError::Storage(format!("create {}: {e}", dir.display())))?;
        }
        Ok(())
    }

    pub fn write_level(&self, area: Area, pin: u32, level: Level) -> Result<(), AppError> {
        let path = self.pin_path(area, pin);
        fs::write(&path, level.as_str())
            .map_err(|e| AppError::Storage(format!("write {}: {e}", path.display())))
    }

    pub fn read_level(&self, area: Area, pin: u32) -> Result<Level, AppError> {
        let path = self.pin_path(area, pin);
        match fs::read(&path) {
            Ok(contents) => Level::parse(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFoundPin(pin)),
            Err(e) => Err(AppError::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    /// Removes the pin from both areas. Missing files are fine.
    pub fn remove(&self, pin: u32) -> Result<(), AppError> {
        for area in [Area::Input, Area::Output] {
            let path = self.pin_path(area, pin);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AppError::Storage(format!("remove {}: {e}", path.display())));
                }
            }
        }
        Ok(())
    }

    pub fn write_meta(&self, contents: &str) -> Result<(), AppError> {
        let path = self.meta_path();
        fs::write(&path, contents)
            .map_err(|e| AppError::Storage(format!("write {}: {e}", path.display())))
    }
}

/// Cheap change indicator of a pin file.
///
/// The content is part of the fingerprint because coarse filesystem clocks can
/// give two quick writes the same modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    modified: Option<SystemTime>,
    contents: Vec<u8>,
}

impl Fingerprint {
    /// `None` when the file is missing or unreadable.
    pub fn take(path: &Path) -> Option<Self> {
        let modified = fs::metadata(path).ok()?.modified().ok();
        let contents = fs::read(path).ok()?;
        Some(Self { modified, contents })
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}
