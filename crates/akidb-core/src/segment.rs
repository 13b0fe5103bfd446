use serde::{Deserialize, Serialize};

use crate::ids::{CollectionId, FieldId, PartitionId, SegmentId};
use crate::timestamp::Timestamp;

/// Lifecycle state for a segment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SegmentState {
    NotExist,
    Growing,
    Sealed,
    Flushing,
    Flushed,
    Dropped,
    Importing,
}

impl SegmentState {
    /// Healthy segments are the ones queries and index builds may still use.
    #[must_use]
    pub fn is_healthy(self) -> bool {
        !matches!(self, SegmentState::NotExist | SegmentState::Dropped)
    }
}

/// One log file persisted for a segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binlog {
    pub entries_num: i64,
    pub timestamp_from: Timestamp,
    pub timestamp_to: Timestamp,
    /// Full storage key, including the root path.
    pub log_path: String,
    pub log_size: i64,
}

impl Binlog {
    /// Binlog with only its storage path set.
    #[must_use]
    pub fn with_path(log_path: impl Into<String>) -> Self {
        Self {
            log_path: log_path.into(),
            ..Self::default()
        }
    }
}

/// Log files of one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldBinlog {
    pub field_id: FieldId,
    pub binlogs: Vec<Binlog>,
}

/// A position in an ingestion channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub channel: String,
    pub timestamp: Timestamp,
}

/// Metadata row for a persisted segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentInfo {
    pub id: SegmentId,
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub insert_channel: String,
    pub state: SegmentState,
    #[serde(default)]
    pub num_rows: i64,
    /// Last write ordered into the insert channel for this segment.
    #[serde(default)]
    pub dml_position: Option<Position>,
    /// Set when the segment transitions to `Dropped`.
    #[serde(default)]
    pub dropped_at: Timestamp,
    /// Source segments, when this segment is a compaction result.
    #[serde(default)]
    pub compaction_from: Vec<SegmentId>,
    #[serde(default)]
    pub binlogs: Vec<FieldBinlog>,
    #[serde(default)]
    pub statslogs: Vec<FieldBinlog>,
    #[serde(default)]
    pub deltalogs: Vec<FieldBinlog>,
}

impl SegmentInfo {
    /// Creates an empty flushed segment on the given channel.
    #[must_use]
    pub fn new(
        id: SegmentId,
        collection_id: CollectionId,
        partition_id: PartitionId,
        insert_channel: impl Into<String>,
    ) -> Self {
        Self {
            id,
            collection_id,
            partition_id,
            insert_channel: insert_channel.into(),
            state: SegmentState::Flushed,
            num_rows: 0,
            dml_position: None,
            dropped_at: Timestamp::ZERO,
            compaction_from: Vec::new(),
            binlogs: Vec::new(),
            statslogs: Vec::new(),
            deltalogs: Vec::new(),
        }
    }

    /// Timestamp of the DML position, zero when no position was recorded.
    #[must_use]
    pub fn dml_timestamp(&self) -> Timestamp {
        self.dml_position
            .as_ref()
            .map_or(Timestamp::ZERO, |pos| pos.timestamp)
    }

    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.state == SegmentState::Dropped
    }

    /// Every log entry of the segment: insert logs, then stats logs, then delta logs.
    pub fn all_logs(&self) -> impl Iterator<Item = &Binlog> {
        self.binlogs
            .iter()
            .chain(self.statslogs.iter())
            .chain(self.deltalogs.iter())
            .flat_map(|group| group.binlogs.iter())
    }
}
