//! Coordinator metadata consumed by the garbage collector.
//!
//! The metadata store owns its own persistence and concurrency control; the
//! collector only reads point-in-time snapshots and issues single-record
//! removals. [`MemoryMeta`] is the in-process implementation used by tests
//! and by the `akidb-gc` tool.

mod memory;

pub use memory::{MemoryMeta, MetaSnapshot};

use akidb_core::{
    BuildId, CollectionId, CoreResult, IndexDefinition, IndexId, Position, SegmentId, SegmentIndex,
    SegmentInfo,
};
use async_trait::async_trait;

/// Metadata accessors and removals used by the GC phases.
///
/// "Healthy" segments are the ones whose state is neither `Dropped` nor
/// `NotExist`; listing via [`DataCoordMeta::list_segments`] returns every
/// row regardless of state.
#[async_trait]
pub trait DataCoordMeta: Send + Sync {
    /// Snapshot of every segment row, including dropped ones.
    async fn list_segments(&self) -> CoreResult<Vec<SegmentInfo>>;

    /// Returns the segment only when it exists and is healthy.
    async fn get_healthy_segment(&self, segment_id: SegmentId) -> CoreResult<Option<SegmentInfo>>;

    /// Healthy segments whose insert channel is `channel`.
    async fn healthy_segments_by_channel(&self, channel: &str) -> CoreResult<Vec<SegmentInfo>>;

    /// Physically removes a segment row. Removing a missing row succeeds.
    async fn drop_segment(&self, segment_id: SegmentId) -> CoreResult<()>;

    /// Whether `channel` still has a live channel record.
    async fn channel_exists(&self, channel: &str) -> CoreResult<bool>;

    /// Checkpoint of `channel`, if one was ever recorded.
    async fn channel_checkpoint(&self, channel: &str) -> CoreResult<Option<Position>>;

    /// Removes the checkpoint record of `channel`.
    async fn drop_channel_checkpoint(&self, channel: &str) -> CoreResult<()>;

    /// Index definitions marked as deleted.
    async fn deleted_indexes(&self) -> CoreResult<Vec<IndexDefinition>>;

    /// Whether the index definition exists and is not marked deleted.
    async fn index_exists(&self, collection_id: CollectionId, index_id: IndexId) -> CoreResult<bool>;

    /// Live (not deleted) index definitions of a collection.
    async fn indexes_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CoreResult<Vec<IndexDefinition>>;

    /// Physically removes an index definition.
    async fn remove_index(&self, collection_id: CollectionId, index_id: IndexId) -> CoreResult<()>;

    /// Snapshot of every segment index build record.
    async fn list_segment_indexes(&self) -> CoreResult<Vec<SegmentIndex>>;

    /// Build records of one segment.
    async fn segment_indexes_for(&self, segment_id: SegmentId) -> CoreResult<Vec<SegmentIndex>>;

    /// Physically removes one build record.
    async fn remove_segment_index(&self, record: &SegmentIndex) -> CoreResult<()>;

    /// Decides whether the files of `build_id` may be recycled.
    ///
    /// Returns `(false, _)` while the build is queued or running, `(true, None)`
    /// when metadata no longer knows the build, and `(true, Some(record))`
    /// otherwise.
    async fn clean_segment_index(
        &self,
        build_id: BuildId,
    ) -> CoreResult<(bool, Option<SegmentIndex>)>;
}
