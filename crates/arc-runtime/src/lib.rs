//! arc runtime: the serial resource booter and the pipe dispatcher, over an
//! explicit context.

pub mod booter;
pub mod config;
pub mod context;
pub mod machine;
pub mod page;
pub mod repl;
pub mod transport;
pub mod types;

pub use booter::{BootReport, Booter};
pub use config::{resolve_base, resolve_store_path, FailurePolicy, LoadPolicy, MachineConfig};
pub use context::{ArcEvent, Context};
pub use machine::{Dispatch, Machine, Model};
pub use page::{Document, Page};
pub use transport::{DirectoryTransport, HttpTransport, Request, Transport};
pub use types::{RuntimeError, RuntimeResult};
