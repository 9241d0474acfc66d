//! Named push-event channels from the native host.
//!
//! One tokio broadcast channel per event name, so every listener gets every
//! event. Emitting never blocks and works from any thread.

use crate::error::HostError;
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Broadcast channel capacity.
/// Lagging listeners skip old events and are told how many they missed.
pub const CHANNEL_CAPACITY: usize = 64;

pub struct EventBus {
    // None once the bus has been shut down.
    channels: Mutex<Option<HashMap<String, Sender<Value>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Send `payload` to every listener of `name`.
    /// Without listeners the event is dropped.
    pub fn emit(&self, name: &str, payload: Value) {
        let Ok(guard) = self.channels.lock() else {
            return;
        };
        if let Some(tx) = guard.as_ref().and_then(|map| map.get(name)) {
            let _ = tx.send(payload);
        } else {
            debug!("No listeners for {}, dropping event", name);
        }
    }

    /// Serialize and emit a typed payload.
    pub fn emit_json<T: serde::Serialize>(&self, name: &str, payload: &T) -> Result<(), HostError> {
        let value = serde_json::to_value(payload).map_err(|source| HostError::Encode {
            what: name.to_string(),
            source,
        })?;
        self.emit(name, value);
        Ok(())
    }

    /// Receive every future event named `name`.
    pub fn listen(&self, name: &str) -> Result<Receiver<Value>, HostError> {
        let mut guard = self.channels.lock().map_err(|_| HostError::Unreachable)?;
        let map = guard.as_mut().ok_or(HostError::Unreachable)?;
        let tx = map
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(tx.subscribe())
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.channels
            .lock()
            .ok()
            .and_then(|guard| {
                guard
                    .as_ref()
                    .and_then(|map| map.get(name).map(|tx| tx.receiver_count()))
            })
            .unwrap_or(0)
    }

    /// Drop every channel. Listeners drain what is buffered, then see `Closed`.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.channels.lock() {
            if guard.take().is_some() {
                info!("Event bus shut down");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.channels
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
