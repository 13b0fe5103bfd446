//! Mock ObjectStore for testing
//!
//! In-memory bucket with controllable modification times and configurable
//! failure patterns, so GC behaviour around tolerance windows and partial
//! failures can be exercised without a real object store.
//!
//! # Features
//!
//! - **Explicit mtimes**: seed objects with any `last_modified`
//! - **Deterministic failures**: a queue consumed by every operation
//! - **Targeted failures**: fail one operation for keys under a prefix
//! - **Call history**: track all operations for assertions
//!
//! # Examples
//!
//! ```rust
//! use akidb_storage::object_store::{MockFailure, MockObjectStore, MockOperation, ObjectStore};
//! use chrono::{Duration, Utc};
//!
//! # async fn example() -> akidb_core::CoreResult<()> {
//! let mock = MockObjectStore::new("files");
//! mock.insert_object("files/insert_log/1/2/3/100/1", Utc::now() - Duration::days(2));
//! mock.fail_on(MockOperation::Delete, "files/insert_log/1/", MockFailure::Permanent("403 Forbidden"));
//!
//! assert!(mock.delete("files/insert_log/1/2/3/100/1").await.is_err());
//! assert_eq!(mock.failed_calls(MockOperation::Delete), 1);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use super::{direct_child, ObjectMetadata, ObjectStore};
use akidb_core::{CoreError, CoreResult};

/// Mock failure pattern.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Transient error. Examples: 500, 503, timeout.
    Transient(&'static str),

    /// Permanent error. Examples: 403, 400.
    Permanent(&'static str),

    /// Backend reports the key as absent.
    NotFound,

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self, key: &str) -> Option<CoreError> {
        match self {
            MockFailure::Transient(msg) => {
                Some(CoreError::StorageError(format!("Transient: {}", msg)))
            }
            MockFailure::Permanent(msg) => {
                Some(CoreError::StorageError(format!("Permanent: {}", msg)))
            }
            MockFailure::NotFound => Some(CoreError::not_found("object", key)),
            MockFailure::Ok => None,
        }
    }
}

/// Operation kinds recorded in the call history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOperation {
    Put,
    Exists,
    List,
    Delete,
    DeletePrefix,
}

/// Mock call history entry.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    pub operation: MockOperation,

    /// Object key or prefix.
    pub key: String,

    pub success: bool,

    pub timestamp: Instant,
}

#[derive(Debug, Clone)]
struct MockObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: MockOperation,
    key_prefix: String,
    failure: MockFailure,
}

/// Mock ObjectStore implementation for testing.
pub struct MockObjectStore {
    root_path: String,

    /// Ordered so listings are deterministic.
    storage: RwLock<BTreeMap<String, MockObject>>,

    /// Failure pattern queue, consumed by any operation.
    failure_queue: RwLock<VecDeque<MockFailure>>,

    /// Persistent failures for one operation under a key prefix.
    failure_rules: RwLock<Vec<FailureRule>>,

    /// Simulated latency for every call.
    latency: Duration,

    call_history: RwLock<Vec<CallHistoryEntry>>,
}

impl MockObjectStore {
    /// Create an empty mock bucket rooted at `root_path`.
    pub fn new(root_path: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            storage: RwLock::new(BTreeMap::new()),
            failure_queue: RwLock::new(VecDeque::new()),
            failure_rules: RwLock::new(Vec::new()),
            latency: Duration::ZERO,
            call_history: RwLock::new(Vec::new()),
        }
    }

    /// Create a mock with a deterministic failure pattern.
    ///
    /// Failures are consumed in order by any operation. Once the queue is
    /// empty, all operations succeed (unless a targeted rule applies).
    pub fn new_with_failures(root_path: impl Into<String>, pattern: Vec<MockFailure>) -> Self {
        let mock = Self::new(root_path);
        *mock.failure_queue.write() = pattern.into();
        mock
    }

    /// Simulate network latency on every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed an object with an explicit modification time.
    pub fn insert_object(&self, key: impl Into<String>, last_modified: DateTime<Utc>) {
        self.storage.write().insert(
            key.into(),
            MockObject {
                data: Bytes::new(),
                last_modified,
            },
        );
    }

    /// Fail every `operation` whose key starts with `key_prefix`.
    pub fn fail_on(&self, operation: MockOperation, key_prefix: impl Into<String>, failure: MockFailure) {
        self.failure_rules.write().push(FailureRule {
            operation,
            key_prefix: key_prefix.into(),
            failure,
        });
    }

    /// Remove all targeted failure rules.
    pub fn clear_failures(&self) {
        self.failure_rules.write().clear();
        self.failure_queue.write().clear();
    }

    /// Get call history for assertions.
    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read().clone()
    }

    /// Clear call history.
    pub fn clear_history(&self) {
        self.call_history.write().clear();
    }

    /// Keys successfully passed to `delete`, in call order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == MockOperation::Delete && entry.success)
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Number of failed calls of one operation kind.
    pub fn failed_calls(&self, operation: MockOperation) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == operation && !entry.success)
            .count()
    }

    /// Number of calls (successful or not) of one operation kind.
    pub fn calls(&self, operation: MockOperation) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == operation)
            .count()
    }

    /// Current number of objects.
    pub fn storage_size(&self) -> usize {
        self.storage.read().len()
    }

    /// Check if key exists in storage.
    pub fn contains_key(&self, key: &str) -> bool {
        self.storage.read().contains_key(key)
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.storage.read().keys().cloned().collect()
    }

    async fn begin(&self, operation: MockOperation, key: &str) -> CoreResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let queued = self.failure_queue.write().pop_front();
        let failure = queued.or_else(|| {
            self.failure_rules
                .read()
                .iter()
                .find(|rule| rule.operation == operation && key.starts_with(&rule.key_prefix))
                .map(|rule| rule.failure.clone())
        });

        match failure.and_then(|f| f.to_error(key)) {
            Some(error) => {
                self.record_call(operation, key, false);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn record_call(&self, operation: MockOperation, key: &str, success: bool) {
        self.call_history.write().push(CallHistoryEntry {
            operation,
            key: key.to_string(),
            success,
            timestamp: Instant::now(),
        });
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn root_path(&self) -> &str {
        &self.root_path
    }

    async fn put(&self, key: &str, data: Bytes) -> CoreResult<()> {
        self.begin(MockOperation::Put, key).await?;

        self.storage.write().insert(
            key.to_string(),
            MockObject {
                data,
                last_modified: Utc::now(),
            },
        );
        self.record_call(MockOperation::Put, key, true);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        self.begin(MockOperation::Exists, key).await?;

        let exists = self.storage.read().contains_key(key);
        self.record_call(MockOperation::Exists, key, true);
        Ok(exists)
    }

    async fn list(&self, prefix: &str, recursive: bool) -> CoreResult<Vec<ObjectMetadata>> {
        self.begin(MockOperation::List, prefix).await?;

        let storage = self.storage.read();
        let mut objects: BTreeMap<String, ObjectMetadata> = BTreeMap::new();
        for (key, object) in storage.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }

            let entry_key = if recursive {
                key.clone()
            } else {
                match direct_child(prefix, key) {
                    Some(child) => child,
                    None => continue,
                }
            };
            let is_prefix = entry_key.ends_with('/');

            let entry = objects.entry(entry_key.clone()).or_insert(ObjectMetadata {
                key: entry_key,
                size_bytes: 0,
                last_modified: object.last_modified,
                etag: None,
            });
            if is_prefix {
                entry.last_modified = entry.last_modified.max(object.last_modified);
            } else {
                entry.size_bytes = object.data.len() as u64;
                entry.last_modified = object.last_modified;
            }
        }
        drop(storage);

        self.record_call(MockOperation::List, prefix, true);
        Ok(objects.into_values().collect())
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        self.begin(MockOperation::Delete, key).await?;

        // Idempotent
        self.storage.write().remove(key);
        self.record_call(MockOperation::Delete, key, true);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CoreResult<()> {
        self.begin(MockOperation::DeletePrefix, prefix).await?;

        self.storage.write().retain(|key, _| !key.starts_with(prefix));
        self.record_call(MockOperation::DeletePrefix, prefix, true);
        Ok(())
    }
}
