//! Shared runtime types.

pub mod error;

pub use error::*;
