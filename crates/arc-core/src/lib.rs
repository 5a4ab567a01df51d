//! arc-core: resource tokens, ordered completion, versioned caching, response
//! framing, text bundles and pipes for the arc loader and dispatcher.

pub mod bundle;
pub mod cache;
pub mod capability;
pub mod frame;
pub mod manifest;
pub mod pipe;
pub mod queue;
pub mod storage;
pub mod token;
pub mod types;

pub use bundle::{parse_bundle, BundleEntry};
pub use cache::{VersionedCache, VERSION_KEY};
pub use capability::{validate, MinVersions, Validation, Variant};
pub use frame::{frame_data, parse_frame, Frame};
pub use manifest::Manifest;
pub use pipe::{FormData, FormPart, Pipe, PipeTemplate, PipeTimes};
pub use queue::OrderedQueue;
pub use storage::{ArcsReader, ArcsWriter, FileStore, KeyValueStore, MemoryStore};
pub use token::{Parsed, Token};
pub use types::*;
