//! Explicit runtime context: registry, event bus, versioned cache and result
//! slots, created once and shared by the booter and the machine.

pub mod events;
pub mod registry;
pub mod results;

use std::sync::{Mutex, MutexGuard, PoisonError};

use arc_core::{KeyValueStore, MemoryStore, VersionedCache};

pub use events::{ArcEvent, EventBus, HandlerId};
pub use registry::Registry;
pub use results::ResultSlots;

pub type DynStore = Box<dyn KeyValueStore + Send>;

pub struct Context {
    registry: Registry,
    events: EventBus,
    cache: Mutex<VersionedCache<DynStore>>,
    results: ResultSlots,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .field("results", &self.results.len())
            .finish()
    }
}

impl Context {
    pub fn new<S>(store: S) -> Self
    where
        S: KeyValueStore + Send + 'static,
    {
        Self {
            registry: Registry::new(),
            events: EventBus::default(),
            cache: Mutex::new(VersionedCache::new(Box::new(store))),
            results: ResultSlots::default(),
        }
    }

    /// Context whose cache lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn results(&self) -> &ResultSlots {
        &self.results
    }

    /// Lock the cache. Never hold the guard across an await.
    pub fn cache(&self) -> MutexGuard<'_, VersionedCache<DynStore>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
