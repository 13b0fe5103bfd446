//! Core domain types for the AkiDB data coordinator.

pub mod config;
pub mod error;
pub mod ids;
pub mod index;
pub mod metrics;
pub mod segment;
pub mod timestamp;

pub use config::{DataCoordConfig, GcConfig, StorageConfig};
pub use error::{CoreError, CoreResult};
pub use ids::{BuildId, CollectionId, FieldId, IndexId, LogId, PartitionId, SegmentId};
pub use index::{IndexDefinition, IndexState, SegmentIndex};
pub use segment::{Binlog, FieldBinlog, Position, SegmentInfo, SegmentState};
pub use timestamp::Timestamp;
