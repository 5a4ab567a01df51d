//! Named-event bus.
//!
//! Handlers registered with [`EventBus::on`] run synchronously when a name is
//! triggered. Every event is also broadcast as an [`ArcEvent`] over a
//! `tokio::sync::broadcast` channel, so consumers can subscribe to the whole
//! stream. With no subscribers the broadcast is silently dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Every event the runtime emits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArcEvent {
    /// A named event, e.g. a resource's cache key once it was announced.
    Triggered { name: String },
    BootStarted { version: f64, resources: usize },
    BootComplete {
        injected: usize,
        cached: usize,
        fetched: usize,
        skipped: usize,
        elapsed_ms: u64,
    },
    /// A pipe came back through its post-hook.
    PipeCompleted { model: String, invocation: String },
}

pub type Handler = Arc<dyn Fn(&str) + Send + Sync>;

/// Token returned by [`EventBus::on`], used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub struct EventBus {
    sender: broadcast::Sender<ArcEvent>,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on<F>(&self, name: &str, handler: F) -> HandlerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered under `name`.
    pub fn off(&self, name: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(name);
        }
        removed
    }

    /// Run the handlers registered for `name`, then broadcast it.
    pub fn trigger(&self, name: &str) {
        // Handlers may call back into the bus.
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        tracing::debug!("Event '{name}' ({} handlers)", handlers.len());
        for handler in handlers {
            handler(name);
        }
        self.emit(ArcEvent::Triggered {
            name: name.to_string(),
        });
    }

    pub fn emit(&self, event: ArcEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArcEvent> {
        self.sender.subscribe()
    }
}
