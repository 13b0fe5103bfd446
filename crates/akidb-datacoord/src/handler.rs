//! Index-eligibility queries.
//!
//! The collector only asks *which* segments count as indexed; how that is
//! decided belongs to the index coordinator.

use std::collections::HashSet;
use std::sync::Arc;

use akidb_core::{CoreResult, IndexState, SegmentId, SegmentInfo};
use async_trait::async_trait;

use crate::meta::DataCoordMeta;

/// Answers which of the given segments are considered indexed.
#[async_trait]
pub trait IndexedSegmentFilter: Send + Sync {
    /// Returns the ids of the indexed subset of `segments`.
    async fn filter_indexed(&self, segments: &[SegmentInfo]) -> CoreResult<HashSet<SegmentId>>;
}

/// Metadata-backed filter: a segment is indexed once every live index of its
/// collection has a finished build for it.
///
/// Collections without any index definition treat every segment as indexed.
pub struct MetaIndexedFilter {
    meta: Arc<dyn DataCoordMeta>,
}

impl MetaIndexedFilter {
    pub fn new(meta: Arc<dyn DataCoordMeta>) -> Self {
        Self { meta }
    }
}

#[async_trait]
impl IndexedSegmentFilter for MetaIndexedFilter {
    async fn filter_indexed(&self, segments: &[SegmentInfo]) -> CoreResult<HashSet<SegmentId>> {
        let mut indexed = HashSet::new();

        for segment in segments {
            let indexes = self.meta.indexes_for_collection(segment.collection_id).await?;
            let finished: HashSet<_> = self
                .meta
                .segment_indexes_for(segment.id)
                .await?
                .into_iter()
                .filter(|record| record.state == IndexState::Finished && !record.deleted)
                .map(|record| record.index_id)
                .collect();

            if indexes.iter().all(|index| finished.contains(&index.index_id)) {
                indexed.insert(segment.id);
            }
        }

        Ok(indexed)
    }
}
