pub mod http;
pub mod memory;
pub mod snapshot;

pub use http::{HttpCollection, HttpEnvironment};
pub use memory::MemoryCollection;
pub use snapshot::{Snapshot, SnapshotEnvironment};
