//! Index build output reconciliation.

use std::collections::HashSet;

use akidb_core::metrics::GC_INDEX_FILES_REMOVED;
use akidb_core::CoreResult;
use akidb_storage::paths;
use serde::Serialize;

use super::GcCore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexFileStats {
    pub builds_seen: usize,
    /// Builds still queued or running, or whose state could not be read.
    pub builds_skipped: usize,
    pub orphan_builds_removed: usize,
    pub files_removed: usize,
    pub remove_failures: usize,
    pub list_failures: usize,
    pub parse_errors: usize,
}

impl GcCore {
    pub(super) async fn recycle_unused_index_files(&self) -> CoreResult<IndexFileStats> {
        let store = self.store()?;
        let root = store.root_path().to_string();
        let index_root = paths::segment_index_root(&root);
        let mut stats = IndexFileStats::default();

        let builds = match store.list(&format!("{}/", index_root), false).await {
            Ok(builds) => builds,
            Err(e) => {
                tracing::warn!(prefix = %index_root, error = %e, "garbageCollector recycleUnusedIndexFiles list keys from chunk manager failed");
                stats.list_failures += 1;
                return Ok(stats);
            }
        };

        for entry in builds {
            if !entry.is_prefix() {
                tracing::warn!(key = %entry.key, "unexpected object directly under index root");
                stats.parse_errors += 1;
                continue;
            }
            let build_id = match paths::parse_build_id_from_prefix(&index_root, &entry.key) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(key = %entry.key, error = %e, "parse build id from index file path failed");
                    stats.parse_errors += 1;
                    continue;
                }
            };
            stats.builds_seen += 1;

            let record = match self.meta.clean_segment_index(build_id).await {
                Ok((true, record)) => record,
                Ok((false, _)) => {
                    tracing::debug!(build_id = %build_id, "build still active, skip recycling its files");
                    stats.builds_skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(build_id = %build_id, error = %e, "failed to check build state");
                    stats.builds_skipped += 1;
                    continue;
                }
            };

            let Some(record) = record else {
                match store.delete_prefix(&entry.key).await {
                    Ok(()) => {
                        tracing::info!(build_id = %build_id, "index meta can be recycled, recycle index files");
                        stats.orphan_builds_removed += 1;
                        GC_INDEX_FILES_REMOVED.with_label_values(&["build"]).inc();
                    }
                    Err(e) => {
                        tracing::warn!(build_id = %build_id, error = %e, "remove index files failed");
                        stats.remove_failures += 1;
                    }
                }
                continue;
            };

            let expected: HashSet<String> = record
                .index_file_keys
                .iter()
                .map(|file_key| {
                    paths::segment_index_file_path(
                        &root,
                        record.build_id,
                        record.index_version,
                        record.partition_id,
                        record.segment_id,
                        file_key,
                    )
                })
                .collect();

            let files = match store.list(&entry.key, true).await {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!(build_id = %build_id, error = %e, "list index files failed");
                    stats.list_failures += 1;
                    continue;
                }
            };

            for file in files {
                if expected.contains(&file.key) {
                    continue;
                }
                match store.delete(&file.key).await {
                    Ok(()) => {
                        tracing::debug!(build_id = %build_id, key = %file.key, "removed stale index file");
                        stats.files_removed += 1;
                        GC_INDEX_FILES_REMOVED.with_label_values(&["file"]).inc();
                    }
                    Err(e) => {
                        tracing::warn!(build_id = %build_id, key = %file.key, error = %e, "remove index file failed");
                        stats.remove_failures += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}
