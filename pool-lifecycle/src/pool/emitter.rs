use std::collections::HashMap;

use parking_lot::RwLock;

use super::{Listener, SignalEmitter};

/// In-memory subscription table for adapters that wrap a real pool client.
///
/// Listeners are cloned out of the table before they run, so a listener may
/// subscribe or emit again without deadlocking.
#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every listener subscribed to `signal` and returns how many ran.
    pub fn emit(&self, signal: &str) -> usize {
        let listeners = match self.listeners.read().get(signal) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    pub fn listener_count(&self, signal: &str) -> usize {
        self.listeners.read().get(signal).map_or(0, Vec::len)
    }
}

impl SignalEmitter for EventEmitter {
    fn on(&self, signal: &str, listener: Listener) {
        self.listeners
            .write()
            .entry(signal.to_owned())
            .or_default()
            .push(listener);
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let listeners = self.listeners.read();
        let mut signals: Vec<_> = listeners.keys().collect();
        signals.sort();
        f.debug_struct("EventEmitter")
            .field("signals", &signals)
            .finish()
    }
}
