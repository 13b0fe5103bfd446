use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{BuildId, CollectionId, FieldId, IndexId, PartitionId, SegmentId};
use crate::timestamp::Timestamp;

/// Index descriptor for one field of a collection.
///
/// Dropping an index only sets `deleted`; the GC performs the physical removal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDefinition {
    pub collection_id: CollectionId,
    pub field_id: FieldId,
    pub index_id: IndexId,
    pub index_name: String,
    #[serde(default)]
    pub type_params: HashMap<String, String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub create_time: Timestamp,
}

impl IndexDefinition {
    #[must_use]
    pub fn new(
        collection_id: CollectionId,
        field_id: FieldId,
        index_id: IndexId,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            collection_id,
            field_id,
            index_id,
            index_name: index_name.into(),
            type_params: HashMap::new(),
            deleted: false,
            create_time: Timestamp::ZERO,
        }
    }
}

/// Progress of a single index build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum IndexState {
    #[default]
    None,
    Unissued,
    InProgress,
    Finished,
    Failed,
}

/// Build record tying one segment to one index build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentIndex {
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub segment_id: SegmentId,
    #[serde(default)]
    pub num_rows: i64,
    pub index_id: IndexId,
    pub build_id: BuildId,
    #[serde(default)]
    pub node_id: i64,
    pub index_version: i64,
    #[serde(default)]
    pub state: IndexState,
    #[serde(default)]
    pub fail_reason: String,
    #[serde(default)]
    pub deleted: bool,
    /// Content-addressed file identifiers produced by the build.
    #[serde(default)]
    pub index_file_keys: Vec<String>,
    #[serde(default)]
    pub create_time: Timestamp,
}

impl SegmentIndex {
    /// Whether files under this build may be touched by the GC.
    ///
    /// Builds that are still queued or running own their prefix exclusively.
    #[must_use]
    pub fn is_recyclable(&self) -> bool {
        self.deleted
            || matches!(
                self.state,
                IndexState::Finished | IndexState::Failed | IndexState::None
            )
    }
}
