//! Object storage access for the AkiDB data coordinator.

pub mod object_store;
pub mod paths;

pub use object_store::{LocalObjectStore, MockObjectStore, ObjectMetadata, ObjectStore};
pub use paths::LogKind;
