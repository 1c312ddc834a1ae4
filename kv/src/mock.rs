//! An in-memory [`Bus`] used by tests and by the demo/no-hypervisor run mode.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::{Bus, BusError, Event};

/// A [`Bus`] backed by a `HashMap` and a channel of injected events,
/// useful for driving the dispatcher in tests without a real hypervisor.
pub struct MockBus {
    store: Mutex<HashMap<String, String>>,
    events: Mutex<Receiver<Event>>,
    inject: Sender<Event>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    pub fn new() -> Self {
        let (inject, events) = mpsc::channel();
        MockBus {
            store: Mutex::new(HashMap::new()),
            events: Mutex::new(events),
            inject,
        }
    }

    /// Injects an event as if the bus itself had produced it, updating the
    /// backing store to match.
    pub fn push_event(&self, path: impl Into<String>, value: Option<String>) {
        let path = path.into();
        match &value {
            Some(v) => {
                self.store.lock().insert(path.clone(), v.clone());
            }
            None => {
                self.store.lock().remove(&path);
            }
        }
        let _ = self.inject.send(Event { path, value });
    }
}

impl Bus for MockBus {
    fn read(&self, path: &str) -> Result<Option<String>, BusError> {
        Ok(self.store.lock().get(path).cloned())
    }

    fn write(&self, path: &str, value: &str) -> Result<(), BusError> {
        self.store.lock().insert(path.to_string(), value.to_string());
        Ok(())
    }

    fn next_event(&self, _root: &str) -> Result<Event, BusError> {
        match self.events.lock().recv_timeout(Duration::from_millis(50)) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Err(BusError::Operation {
                path: _root.to_string(),
                source: "no event within poll window".to_string(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(BusError::Connect("injector dropped".to_string())),
        }
    }
}
