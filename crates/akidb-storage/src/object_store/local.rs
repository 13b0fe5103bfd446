//! Local filesystem implementation of ObjectStore
//!
//! Objects are stored as files under a base directory, with the key (which
//! includes the root path) as the relative path.

use super::{ObjectMetadata, ObjectStore};
use akidb_core::{CoreError, CoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Local filesystem object store
///
/// # Example
///
/// ```rust,no_run
/// use akidb_storage::object_store::{LocalObjectStore, ObjectStore};
/// use bytes::Bytes;
///
/// #[tokio::main]
/// async fn main() -> akidb_core::CoreResult<()> {
///     let store = LocalObjectStore::new("./data", "files").await?;
///     store.put("files/insert_log/1/2/3/100/1", Bytes::from("log")).await?;
///
///     let collections = store.list("files/insert_log/", false).await?;
///     println!("Found {} collection prefixes", collections.len());
///
///     Ok(())
/// }
/// ```
pub struct LocalObjectStore {
    base_dir: PathBuf,
    root_path: String,
}

impl LocalObjectStore {
    /// Create a new local object store
    ///
    /// Creates the base directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::IoError` if directory creation fails
    pub async fn new(base_dir: impl AsRef<Path>, root_path: impl Into<String>) -> CoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        tracing::info!(base_dir = %base_dir.display(), "Opened local object store");
        Ok(Self {
            base_dir,
            root_path: root_path.into(),
        })
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    /// Split a prefix into the directory key to read and the remaining name filter.
    fn split_prefix(prefix: &str) -> (&str, &str) {
        match prefix.rfind('/') {
            Some(idx) => (&prefix[..idx], &prefix[idx + 1..]),
            None => ("", prefix),
        }
    }

    fn join_key(dir_key: &str, name: &str) -> String {
        if dir_key.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", dir_key, name)
        }
    }

    fn to_metadata(key: String, metadata: &std::fs::Metadata) -> ObjectMetadata {
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        ObjectMetadata {
            key,
            size_bytes: if metadata.is_file() { metadata.len() } else { 0 },
            last_modified,
            etag: None,
        }
    }

    /// Recursively list all files under a directory key
    fn list_recursive<'a>(
        &'a self,
        dir_key: String,
        out: &'a mut Vec<ObjectMetadata>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = CoreResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut read_dir = match tokio::fs::read_dir(self.full_path(&dir_key)).await {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = read_dir.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let key = Self::join_key(&dir_key, &name);
                let metadata = entry.metadata().await?;

                if metadata.is_file() {
                    out.push(Self::to_metadata(key, &metadata));
                } else if metadata.is_dir() {
                    self.list_recursive(key, out).await?;
                }
            }

            Ok(())
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn root_path(&self) -> &str {
        &self.root_path
    }

    async fn put(&self, key: &str, data: Bytes) -> CoreResult<()> {
        if key.is_empty() || key.ends_with('/') {
            return Err(CoreError::invalid_path(key, "object key must name a file"));
        }

        let path = self.full_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> CoreResult<bool> {
        Ok(tokio::fs::try_exists(self.full_path(key)).await?)
    }

    async fn list(&self, prefix: &str, recursive: bool) -> CoreResult<Vec<ObjectMetadata>> {
        let (dir_key, name_filter) = Self::split_prefix(prefix);

        let mut read_dir = match tokio::fs::read_dir(self.full_path(dir_key)).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut results = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(name_filter) {
                continue;
            }

            let key = Self::join_key(dir_key, &name);
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                results.push(Self::to_metadata(key, &metadata));
            } else if metadata.is_dir() {
                if recursive {
                    self.list_recursive(key, &mut results).await?;
                } else {
                    results.push(Self::to_metadata(format!("{}/", key), &metadata));
                }
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        match tokio::fs::remove_file(self.full_path(key)).await {
            Ok(()) => Ok(()),
            // Idempotent - no error if file doesn't exist
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> CoreResult<()> {
        tracing::debug!(prefix, base_dir = %self.base_dir.display(), "Removing objects by prefix");
        if let Some(dir_key) = prefix.strip_suffix('/') {
            return match tokio::fs::remove_dir_all(self.full_path(dir_key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        for object in self.list(prefix, true).await? {
            self.delete(&object.key).await?;
        }
        Ok(())
    }
}
