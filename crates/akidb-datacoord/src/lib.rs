//! AkiDB data coordinator: metadata access and storage garbage collection.

pub mod gc;
pub mod handler;
pub mod meta;

pub use gc::{GarbageCollector, GcOption, TickReport};
pub use handler::{IndexedSegmentFilter, MetaIndexedFilter};
pub use meta::{DataCoordMeta, MemoryMeta, MetaSnapshot};
