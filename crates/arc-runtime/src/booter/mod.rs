//! The booter: ordered, versioned resource loading.

pub mod loader;
pub mod queue;

pub use loader::{BootReport, Booter, ContextHook};
pub use queue::{spawn_queue, Delivery, QueueHandle, QueueSummary};
