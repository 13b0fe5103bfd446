//! Storage scan for log objects unknown to metadata.

use std::collections::HashSet;

use akidb_core::metrics::GC_SCANNED_OBJECTS;
use akidb_core::{CoreResult, SegmentId};
use akidb_storage::paths::{self, LogKind};
use chrono::Utc;
use serde::Serialize;

use super::{object_age, GcCore};

/// Counters for one storage scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub total: usize,
    pub valid: usize,
    /// Keys whose segment id could not be derived.
    pub parse_errors: usize,
    /// Unreferenced keys younger than the missing tolerance.
    pub kept_recent: usize,
    pub removed: usize,
    pub remove_failed: usize,
    pub list_failures: usize,
    /// Collection prefixes rejected by the collection validator.
    pub skipped_prefixes: usize,
    pub removed_keys: Vec<String>,
}

fn record(kind: LogKind, outcome: &str) {
    GC_SCANNED_OBJECTS
        .with_label_values(&[kind.prefix(), outcome])
        .inc();
}

impl GcCore {
    pub(super) async fn scan(&self) -> CoreResult<ScanStats> {
        let store = self.store()?;
        let root = store.root_path().to_string();

        let segments = self.meta.list_segments().await?;
        let live: HashSet<SegmentId> = segments.iter().map(|s| s.id).collect();
        let referenced: HashSet<&str> = segments
            .iter()
            .flat_map(|s| s.all_logs())
            .map(|log| log.log_path.as_str())
            .collect();

        let mut stats = ScanStats::default();
        let now = Utc::now();

        for kind in LogKind::ALL {
            let kind_root = paths::log_root(&root, kind);
            let children = match store.list(&format!("{}/", kind_root), false).await {
                Ok(children) => children,
                Err(e) => {
                    tracing::warn!(prefix = %kind_root, error = %e, "failed to list log prefix");
                    stats.list_failures += 1;
                    continue;
                }
            };

            for child in children.into_iter().filter(|c| c.is_prefix()) {
                match paths::parse_collection_prefix(&kind_root, &child.key) {
                    Ok(collection_id) if !self.collection_valid(collection_id) => {
                        tracing::debug!(prefix = %child.key, "collection not tracked, skip scan");
                        stats.skipped_prefixes += 1;
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(prefix = %child.key, error = %e, "unexpected collection prefix");
                        stats.parse_errors += 1;
                        continue;
                    }
                }

                let objects = match store.list(&child.key, true).await {
                    Ok(objects) => objects,
                    Err(e) => {
                        tracing::warn!(prefix = %child.key, error = %e, "failed to list collection prefix");
                        stats.list_failures += 1;
                        continue;
                    }
                };

                for object in objects {
                    stats.total += 1;

                    if referenced.contains(object.key.as_str()) {
                        stats.valid += 1;
                        record(kind, "valid");
                        continue;
                    }

                    let segment_id = match paths::parse_segment_id_from_binlog(&root, &object.key) {
                        Ok(id) => id,
                        Err(e) => {
                            tracing::warn!(key = %object.key, error = %e, "parse segment id error");
                            stats.parse_errors += 1;
                            record(kind, "parse_error");
                            continue;
                        }
                    };

                    // Stats logs get rewritten without every old path staying in meta.
                    if kind == LogKind::Stats && live.contains(&segment_id) {
                        stats.valid += 1;
                        record(kind, "valid");
                        continue;
                    }

                    if object_age(now, object.last_modified) < self.option.missing_tolerance {
                        stats.kept_recent += 1;
                        record(kind, "kept");
                        continue;
                    }

                    match store.delete(&object.key).await {
                        Ok(()) => {
                            tracing::info!(key = %object.key, segment_id = %segment_id, "removed orphan object");
                            stats.removed += 1;
                            record(kind, "removed");
                            stats.removed_keys.push(object.key);
                        }
                        Err(e) => {
                            tracing::warn!(key = %object.key, error = %e, "failed to remove object");
                            stats.remove_failed += 1;
                            record(kind, "remove_failed");
                        }
                    }
                }
            }
        }

        tracing::info!(
            total = stats.total,
            valid = stats.valid,
            parse_errors = stats.parse_errors,
            removed = stats.removed,
            "scan file to do garbage collection"
        );
        Ok(stats)
    }
}
