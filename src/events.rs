use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::gpio::{Level, LevelCallback};

#[derive(Debug, Clone, Serialize)]
pub struct EdgeEvent {
    pub pin_id: u32,
    pub level: Level,
    pub timestamp_ms: u64,
}

/// Fans watcher callbacks out to websocket subscribers and keeps a bounded
/// history per pin.
pub struct EventCallbackHandler {
    event_tx: broadcast::Sender<EdgeEvent>,
    event_history: RwLock<FxHashMap<u32, VecDeque<EdgeEvent>>>,
    event_history_capacity: usize,
}

impl EventCallbackHandler {
    pub fn new(broadcast_capacity: usize, event_history_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            event_tx,
            event_history: RwLock::new(FxHashMap::default()),
            event_history_capacity,
        }
    }

    pub fn dispatch(&self, event: EdgeEvent) {
        if self.event_history_capacity > 0 {
            let mut map = self.event_history.write();
            let history = map.entry(event.pin_id).or_default();
            while history.len() >= self.event_history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EdgeEvent> {
        self.event_tx.subscribe()
    }

    /// Oldest first; `limit` keeps the most recent events.
    pub fn events(&self, pin_id: u32, limit: Option<usize>) -> Vec<EdgeEvent> {
        let map = self.event_history.read();
        let Some(history) = map.get(&pin_id) else {
            return Vec::new();
        };
        let skip = limit
            .map(|lim| history.len().saturating_sub(lim))
            .unwrap_or(0);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn last_event(&self, pin_id: u32) -> Option<EdgeEvent> {
        self.event_history
            .read()
            .get(&pin_id)
            .and_then(|d| d.back().cloned())
    }

    pub fn clear(&self, pin_id: u32) {
        self.event_history.write().remove(&pin_id);
    }
}

pub type EventHandler = Arc<EventCallbackHandler>;

/// Watcher callback that records an [`EdgeEvent`] on `handler`.
pub fn dispatching_callback(handler: EventHandler) -> LevelCallback {
    Arc::new(move |pin_id, level| {
        handler.dispatch(EdgeEvent {
            pin_id,
            level,
            timestamp_ms: epoch_millis(),
        })
    })
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
