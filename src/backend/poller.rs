use log::{trace, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::backend::storage::Fingerprint;
use crate::error::AppError;
use crate::gpio::{Level, LevelCallback, Trigger};

#[derive(Default)]
struct CancelSignal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelSignal {
    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.wake.notify_all();
    }

    /// Sleeps for one interval, returning early if cancelled. Returns whether
    /// the poller should stop.
    fn wait(&self, interval: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        if !*cancelled {
            self.wake.wait_for(&mut cancelled, interval);
        }
        *cancelled
    }
}

/// Samples one input pin file on its own thread and calls back on level
/// changes accepted by the trigger. Dropping it stops the thread.
pub struct EdgePoller {
    cancel: Arc<CancelSignal>,
    handle: Option<JoinHandle<()>>,
}

impl EdgePoller {
    pub fn spawn(
        pin: u32,
        path: PathBuf,
        interval: Duration,
        trigger: Trigger,
        callback: LevelCallback,
    ) -> Result<Self, AppError> {
        let cancel = Arc::new(CancelSignal::default());
        let cancel_flag = cancel.clone();
        // changes made before attaching are not edges
        let mut last_seen = Fingerprint::take(&path);

        let handle = thread::Builder::new()
            .name(format!("gpio-poll-{pin}"))
            .spawn(move || {
                let mut marker: Option<Level> = None;

                while !cancel_flag.wait(interval) {
                    let current = Fingerprint::take(&path);
                    if current == last_seen {
                        continue;
                    }
                    last_seen = current.clone();

                    let Some(fingerprint) = current else {
                        continue;
                    };
                    let level = match Level::parse(fingerprint.contents()) {
                        Ok(level) => level,
                        Err(e) => {
                            warn!("sampling pin {pin}: {e}");
                            continue;
                        }
                    };
                    if marker == Some(level) {
                        continue;
                    }

                    trace!("pin {pin} changed to {}", level.as_str());
                    if trigger.matches(level) {
                        callback(pin, level);
                    }
                    marker = Some(level);
                }
            })
            .map_err(|e| AppError::Gpio(format!("spawn poller for pin {pin}: {e}")))?;

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }
}

impl Drop for EdgePoller {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            // a callback may tear down its own watcher
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
