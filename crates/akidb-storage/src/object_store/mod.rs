//! Object Store abstraction for the data coordinator
//!
//! The garbage collector only ever lists and deletes; `put` exists so tools
//! and tests can lay out fixtures through the same interface.
//!
//! Backends:
//! - Local filesystem (development, the `akidb-gc` tool)
//! - In-memory mock (tests, with failure injection)

mod local;
mod mock;

pub use local::LocalObjectStore;
pub use mock::{CallHistoryEntry, MockFailure, MockObjectStore, MockOperation};

use akidb_core::CoreResult;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object metadata returned by list operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Full object key. Sub-prefixes from a non-recursive listing end with `/`.
    pub key: String,
    /// Size in bytes (0 for sub-prefixes)
    pub size_bytes: u64,
    /// Last modification timestamp
    pub last_modified: DateTime<Utc>,
    /// ETag (None for local storage)
    pub etag: Option<String>,
}

impl ObjectMetadata {
    /// True for a sub-prefix entry of a non-recursive listing.
    #[must_use]
    pub fn is_prefix(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// Object Store trait - S3-like interface over the coordinator's bucket
///
/// All implementations must be thread-safe (Send + Sync). Keys are UTF-8
/// strings using `/` as separator and already include [`ObjectStore::root_path`].
///
/// # Error Handling
///
/// - `CoreError::NotFound` - Object does not exist. `delete` never returns it
///   for a missing key, but callers must still accept it as "already gone".
/// - `CoreError::StorageError` - Backend-specific error (network, permissions, etc.)
/// - `CoreError::IoError` - I/O error (local filesystem only)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Root path all coordinator keys live under (no trailing `/`).
    fn root_path(&self) -> &str;

    /// Put object (overwrites if exists)
    async fn put(&self, key: &str, data: Bytes) -> CoreResult<()>;

    /// Check if object exists
    async fn exists(&self, key: &str) -> CoreResult<bool>;

    /// List keys starting with `prefix`
    ///
    /// With `recursive == false` only direct children are returned: objects
    /// directly under the prefix, and one entry per sub-prefix with a trailing
    /// `/`. With `recursive == true` every object below the prefix is returned.
    async fn list(&self, prefix: &str, recursive: bool) -> CoreResult<Vec<ObjectMetadata>>;

    /// Delete object (idempotent)
    async fn delete(&self, key: &str) -> CoreResult<()>;

    /// Delete every object whose key starts with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> CoreResult<()>;
}

/// Direct child of `prefix` for `key`, as reported by a non-recursive listing.
///
/// Returns the key itself for objects directly under the prefix and
/// `prefix + first_component + "/"` for deeper keys.
pub(crate) fn direct_child(prefix: &str, key: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?;
    match rest.find('/') {
        Some(idx) => Some(format!("{}{}", prefix, &rest[..=idx])),
        None => Some(key.to_string()),
    }
}
