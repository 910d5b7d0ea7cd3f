//! Pub/sub registry for inbound and lifecycle events.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::error;

/// Emitted with `null` when the socket opens.
pub const EVENT_OPEN: &str = "open";
/// Emitted with `{"reason": ..}` when the socket closes.
pub const EVENT_CLOSE: &str = "close";
/// Emitted with `{"message": ..}` on transport errors and unparseable frames.
pub const EVENT_ERROR: &str = "error";
/// Emitted with the full `{type, data}` frame for every inbound message.
pub const EVENT_MESSAGE: &str = "message";

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<BTreeMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Call every listener for `event` in registration order.
    ///
    /// Callbacks run after the lock is released, so they may register or
    /// remove listeners. A panicking callback is logged and skipped.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let callbacks: Vec<Listener> = match self.listeners.read().get(event) {
            Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };

        for callback in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                error!("Listener for '{}' panicked", event);
            }
        }
        callbacks.len()
    }

    /// Event names with at least one listener, sorted.
    pub fn event_names(&self) -> Vec<String> {
        self.listeners.read().keys().cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}
