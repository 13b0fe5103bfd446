//! In-memory metadata store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use akidb_core::{
    BuildId, CollectionId, CoreError, CoreResult, IndexDefinition, IndexId, Position, SegmentId,
    SegmentIndex, SegmentInfo,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::DataCoordMeta;

/// Serializable image of the coordinator metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaSnapshot {
    #[serde(default)]
    pub segments: Vec<SegmentInfo>,
    /// Channels that still have a live channel record.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub channel_checkpoints: Vec<Position>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    #[serde(default)]
    pub segment_indexes: Vec<SegmentIndex>,
}

#[derive(Default)]
struct MetaState {
    segments: BTreeMap<SegmentId, SegmentInfo>,
    channels: BTreeSet<String>,
    checkpoints: HashMap<String, Position>,
    indexes: BTreeMap<(CollectionId, IndexId), IndexDefinition>,
    segment_indexes: BTreeMap<BuildId, SegmentIndex>,
}

/// In-memory metadata store backed by `parking_lot` locks.
///
/// Reads return cloned snapshots; each removal touches a single record.
pub struct MemoryMeta {
    state: RwLock<MetaState>,
    fail_removals: AtomicBool,
}

impl MemoryMeta {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MetaState::default()),
            fail_removals: AtomicBool::new(false),
        }
    }

    /// Build a store from a snapshot.
    pub fn from_snapshot(snapshot: MetaSnapshot) -> Self {
        let meta = Self::new();
        {
            let mut state = meta.state.write();
            for segment in snapshot.segments {
                state.segments.insert(segment.id, segment);
            }
            state.channels.extend(snapshot.channels);
            for position in snapshot.channel_checkpoints {
                state.checkpoints.insert(position.channel.clone(), position);
            }
            for index in snapshot.indexes {
                state
                    .indexes
                    .insert((index.collection_id, index.index_id), index);
            }
            for record in snapshot.segment_indexes {
                state.segment_indexes.insert(record.build_id, record);
            }
        }
        meta
    }

    /// Load a JSON snapshot from disk.
    ///
    /// # Errors
    ///
    /// I/O errors reading the file and `SerializationError` for malformed JSON.
    pub async fn load_json(path: impl AsRef<Path>) -> CoreResult<Self> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let snapshot: MetaSnapshot = serde_json::from_slice(&raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents back as a JSON snapshot.
    ///
    /// The file is replaced through a sibling temp file, so a crash mid-write
    /// leaves the previous snapshot intact.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let path = path.as_ref();
        let raw = serde_json::to_vec_pretty(&self.snapshot())?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Current contents as a snapshot.
    pub fn snapshot(&self) -> MetaSnapshot {
        let state = self.state.read();
        MetaSnapshot {
            segments: state.segments.values().cloned().collect(),
            channels: state.channels.iter().cloned().collect(),
            channel_checkpoints: state.checkpoints.values().cloned().collect(),
            indexes: state.indexes.values().cloned().collect(),
            segment_indexes: state.segment_indexes.values().cloned().collect(),
        }
    }

    /// Make every removal fail until reset, to exercise retry paths.
    pub fn set_fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    fn check_removal(&self, entity: &str) -> CoreResult<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(CoreError::internal(format!(
                "injected failure removing {}",
                entity
            )));
        }
        Ok(())
    }

    pub fn add_segment(&self, segment: SegmentInfo) {
        self.state.write().segments.insert(segment.id, segment);
    }

    /// Any segment row, healthy or not.
    pub fn segment(&self, segment_id: SegmentId) -> Option<SegmentInfo> {
        self.state.read().segments.get(&segment_id).cloned()
    }

    pub fn add_channel(&self, channel: impl Into<String>) {
        self.state.write().channels.insert(channel.into());
    }

    pub fn remove_channel(&self, channel: &str) {
        self.state.write().channels.remove(channel);
    }

    pub fn set_channel_checkpoint(&self, position: Position) {
        self.state
            .write()
            .checkpoints
            .insert(position.channel.clone(), position);
    }

    pub fn has_channel_checkpoint(&self, channel: &str) -> bool {
        self.state.read().checkpoints.contains_key(channel)
    }

    pub fn add_index(&self, index: IndexDefinition) {
        self.state
            .write()
            .indexes
            .insert((index.collection_id, index.index_id), index);
    }

    /// Soft-delete an index definition, as dropping an index does.
    pub fn mark_index_deleted(&self, collection_id: CollectionId, index_id: IndexId) {
        if let Some(index) = self.state.write().indexes.get_mut(&(collection_id, index_id)) {
            index.deleted = true;
        }
    }

    /// Any index definition, deleted or not.
    pub fn index(&self, collection_id: CollectionId, index_id: IndexId) -> Option<IndexDefinition> {
        self.state
            .read()
            .indexes
            .get(&(collection_id, index_id))
            .cloned()
    }

    pub fn add_segment_index(&self, record: SegmentIndex) {
        self.state
            .write()
            .segment_indexes
            .insert(record.build_id, record);
    }

    pub fn segment_index(&self, build_id: BuildId) -> Option<SegmentIndex> {
        self.state.read().segment_indexes.get(&build_id).cloned()
    }
}

impl Default for MemoryMeta {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataCoordMeta for MemoryMeta {
    async fn list_segments(&self) -> CoreResult<Vec<SegmentInfo>> {
        Ok(self.state.read().segments.values().cloned().collect())
    }

    async fn get_healthy_segment(&self, segment_id: SegmentId) -> CoreResult<Option<SegmentInfo>> {
        Ok(self
            .state
            .read()
            .segments
            .get(&segment_id)
            .filter(|segment| segment.state.is_healthy())
            .cloned())
    }

    async fn healthy_segments_by_channel(&self, channel: &str) -> CoreResult<Vec<SegmentInfo>> {
        Ok(self
            .state
            .read()
            .segments
            .values()
            .filter(|segment| segment.state.is_healthy() && segment.insert_channel == channel)
            .cloned()
            .collect())
    }

    async fn drop_segment(&self, segment_id: SegmentId) -> CoreResult<()> {
        self.check_removal("segment")?;
        self.state.write().segments.remove(&segment_id);
        Ok(())
    }

    async fn channel_exists(&self, channel: &str) -> CoreResult<bool> {
        Ok(self.state.read().channels.contains(channel))
    }

    async fn channel_checkpoint(&self, channel: &str) -> CoreResult<Option<Position>> {
        Ok(self.state.read().checkpoints.get(channel).cloned())
    }

    async fn drop_channel_checkpoint(&self, channel: &str) -> CoreResult<()> {
        self.check_removal("channel checkpoint")?;
        self.state.write().checkpoints.remove(channel);
        Ok(())
    }

    async fn deleted_indexes(&self) -> CoreResult<Vec<IndexDefinition>> {
        Ok(self
            .state
            .read()
            .indexes
            .values()
            .filter(|index| index.deleted)
            .cloned()
            .collect())
    }

    async fn index_exists(&self, collection_id: CollectionId, index_id: IndexId) -> CoreResult<bool> {
        Ok(self
            .state
            .read()
            .indexes
            .get(&(collection_id, index_id))
            .is_some_and(|index| !index.deleted))
    }

    async fn indexes_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CoreResult<Vec<IndexDefinition>> {
        Ok(self
            .state
            .read()
            .indexes
            .values()
            .filter(|index| index.collection_id == collection_id && !index.deleted)
            .cloned()
            .collect())
    }

    async fn remove_index(&self, collection_id: CollectionId, index_id: IndexId) -> CoreResult<()> {
        self.check_removal("index")?;
        self.state
            .write()
            .indexes
            .remove(&(collection_id, index_id))
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("index", index_id.to_string()))
    }

    async fn list_segment_indexes(&self) -> CoreResult<Vec<SegmentIndex>> {
        Ok(self.state.read().segment_indexes.values().cloned().collect())
    }

    async fn segment_indexes_for(&self, segment_id: SegmentId) -> CoreResult<Vec<SegmentIndex>> {
        Ok(self
            .state
            .read()
            .segment_indexes
            .values()
            .filter(|record| record.segment_id == segment_id)
            .cloned()
            .collect())
    }

    async fn remove_segment_index(&self, record: &SegmentIndex) -> CoreResult<()> {
        self.check_removal("segment index")?;
        self.state.write().segment_indexes.remove(&record.build_id);
        Ok(())
    }

    async fn clean_segment_index(
        &self,
        build_id: BuildId,
    ) -> CoreResult<(bool, Option<SegmentIndex>)> {
        match self.state.read().segment_indexes.get(&build_id) {
            None => Ok((true, None)),
            Some(record) if record.is_recyclable() => Ok((true, Some(record.clone()))),
            Some(_) => Ok((false, None)),
        }
    }
}
