//! Index metadata reclamation.
//!
//! Two independent passes: soft-deleted index definitions, then build records
//! whose segment or index definition is gone. A failed snapshot read in one
//! pass does not stop the other.

use akidb_core::metrics::GC_INDEX_META_REMOVED;
use akidb_core::{CoreResult, SegmentIndex};
use serde::Serialize;

use super::GcCore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexMetaStats {
    pub indexes_removed: usize,
    pub index_remove_failures: usize,
    pub segment_indexes_removed: usize,
    pub segment_index_remove_failures: usize,
    /// Build records skipped because their segment or index could not be read.
    pub lookup_failures: usize,
    /// Passes whose snapshot read failed; retried next tick.
    pub failed_passes: Vec<&'static str>,
}

impl GcCore {
    /// Soft-deleted definitions first, then orphaned build records.
    pub(super) async fn recycle_unused_index_meta(&self) -> CoreResult<IndexMetaStats> {
        let mut stats = IndexMetaStats::default();

        if let Err(e) = self.recycle_unused_indexes(&mut stats).await {
            tracing::warn!(error = %e, "failed to list deleted indexes, wait to retry");
            stats.failed_passes.push("definitions");
        }
        if let Err(e) = self.recycle_unused_segment_indexes(&mut stats).await {
            tracing::warn!(error = %e, "failed to list segment indexes, wait to retry");
            stats.failed_passes.push("segment_indexes");
        }

        Ok(stats)
    }

    async fn recycle_unused_indexes(&self, stats: &mut IndexMetaStats) -> CoreResult<()> {
        for index in self.meta.deleted_indexes().await? {
            match self.meta.remove_index(index.collection_id, index.index_id).await {
                Ok(()) => {
                    tracing::info!(
                        collection_id = %index.collection_id,
                        index_id = %index.index_id,
                        "remove index meta success"
                    );
                    stats.indexes_removed += 1;
                    GC_INDEX_META_REMOVED.with_label_values(&["definition"]).inc();
                }
                Err(e) => {
                    tracing::warn!(
                        collection_id = %index.collection_id,
                        index_id = %index.index_id,
                        error = %e,
                        "remove index on collection fail"
                    );
                    stats.index_remove_failures += 1;
                }
            }
        }
        Ok(())
    }

    async fn recycle_unused_segment_indexes(&self, stats: &mut IndexMetaStats) -> CoreResult<()> {
        for record in self.meta.list_segment_indexes().await? {
            match self.is_orphaned(&record).await {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    tracing::warn!(
                        segment_id = %record.segment_id,
                        build_id = %record.build_id,
                        error = %e,
                        "failed to check segment index owner, wait to retry"
                    );
                    stats.lookup_failures += 1;
                    continue;
                }
            }

            match self.meta.remove_segment_index(&record).await {
                Ok(()) => {
                    tracing::info!(
                        segment_id = %record.segment_id,
                        build_id = %record.build_id,
                        "index meta recycle success"
                    );
                    stats.segment_indexes_removed += 1;
                    GC_INDEX_META_REMOVED.with_label_values(&["segment_index"]).inc();
                }
                Err(e) => {
                    tracing::warn!(
                        segment_id = %record.segment_id,
                        build_id = %record.build_id,
                        error = %e,
                        "delete index meta failed, wait to retry"
                    );
                    stats.segment_index_remove_failures += 1;
                }
            }
        }
        Ok(())
    }

    /// Segment no longer healthy, or index definition gone.
    async fn is_orphaned(&self, record: &SegmentIndex) -> CoreResult<bool> {
        if self.meta.get_healthy_segment(record.segment_id).await?.is_none() {
            return Ok(true);
        }
        Ok(!self
            .meta
            .index_exists(record.collection_id, record.index_id)
            .await?)
    }
}
