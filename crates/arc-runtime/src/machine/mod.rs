//! The machine: routes pipes through model hooks and the transport.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{Dispatch, Machine};
pub use registry::{Hook, Model, ModelRegistry};
