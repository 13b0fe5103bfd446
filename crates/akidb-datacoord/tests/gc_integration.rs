//! End-to-end collector behaviour against the mock object store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use akidb_core::{
    Binlog, BuildId, CollectionId, CoreError, CoreResult, FieldBinlog, FieldId, GcConfig, IndexDefinition,
    IndexId, IndexState, PartitionId, Position, SegmentId, SegmentIndex, SegmentInfo,
    SegmentState, Timestamp,
};
use akidb_datacoord::meta::DataCoordMeta;
use akidb_datacoord::{GarbageCollector, GcOption, IndexedSegmentFilter, MemoryMeta, MetaIndexedFilter};
use akidb_storage::paths::{self, LogKind};
use akidb_core::metrics::GC_INDEX_FILES_REMOVED;
use akidb_storage::object_store::MockOperation;
use akidb_storage::MockObjectStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

const ROOT: &str = "files";

fn hours_ago(h: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(h)
}

fn option(store: &Arc<MockObjectStore>) -> GcOption {
    let mut option = GcOption::from_config(&GcConfig::default(), Some(store.clone()));
    option.missing_tolerance = Duration::from_secs(3600);
    option.drop_tolerance = Duration::from_secs(3600);
    option
}

fn collector(meta: &Arc<MemoryMeta>, option: GcOption) -> GarbageCollector {
    GarbageCollector::new(
        meta.clone(),
        Arc::new(MetaIndexedFilter::new(meta.clone())),
        option,
    )
}

fn insert_log(segment: i64, log: i64) -> String {
    paths::field_log_path(
        ROOT,
        LogKind::Insert,
        CollectionId::new(1),
        PartitionId::new(10),
        SegmentId::new(segment),
        FieldId::new(100),
        akidb_core::LogId::new(log),
    )
}

fn stats_log(segment: i64, log: i64) -> String {
    paths::field_log_path(
        ROOT,
        LogKind::Stats,
        CollectionId::new(1),
        PartitionId::new(10),
        SegmentId::new(segment),
        FieldId::new(100),
        akidb_core::LogId::new(log),
    )
}

fn segment(id: i64, channel: &str) -> SegmentInfo {
    SegmentInfo::new(
        SegmentId::new(id),
        CollectionId::new(1),
        PartitionId::new(10),
        channel,
    )
}

fn dropped_segment(id: i64, channel: &str, dropped_hours_ago: i64) -> SegmentInfo {
    let mut seg = segment(id, channel);
    seg.state = SegmentState::Dropped;
    seg.dropped_at = Timestamp::compose(hours_ago(dropped_hours_ago), 0);
    seg.binlogs = vec![FieldBinlog {
        field_id: FieldId::new(100),
        binlogs: vec![Binlog::with_path(insert_log(id, 1))],
    }];
    seg
}

fn with_dml(mut seg: SegmentInfo, ts: u64) -> SegmentInfo {
    seg.dml_position = Some(Position {
        channel: seg.insert_channel.clone(),
        timestamp: Timestamp::from_raw(ts),
    });
    seg
}

#[tokio::test]
async fn test_missing_tolerance_gates_orphan_objects() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));

    let young = insert_log(5, 1);
    let aged = insert_log(6, 1);
    store.insert_object(&young, Utc::now() - chrono::Duration::minutes(10));
    store.insert_object(&aged, hours_ago(2));

    let gc = collector(&meta, option(&store));
    let stats = gc.scan().await.unwrap();
    assert_eq!(stats.kept_recent, 1);
    assert_eq!(stats.removed_keys, vec![aged.clone()]);
    assert!(store.contains_key(&young));
    assert!(!store.contains_key(&aged));

    let stats = gc.scan().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.removed, 0);
}

#[tokio::test]
async fn test_drop_tolerance_and_single_reclamation() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));

    meta.add_segment(dropped_segment(1, "ch-0", 0));
    meta.add_segment(dropped_segment(2, "ch-0", 2));
    store.insert_object(insert_log(1, 1), hours_ago(0));
    store.insert_object(insert_log(2, 1), hours_ago(2));

    let gc = collector(&meta, option(&store));
    let report = gc.run_once().await.unwrap();
    assert_eq!(report.segments.reclaimed, 1);
    assert_eq!(report.segments.deferred_tolerance, 1);
    assert!(meta.segment(SegmentId::new(1)).is_some());
    assert!(meta.segment(SegmentId::new(2)).is_none());
    assert!(store.contains_key(&insert_log(1, 1)));
    assert!(!store.contains_key(&insert_log(2, 1)));

    let report = gc.run_once().await.unwrap();
    assert_eq!(report.segments.reclaimed, 0);
    assert!(report.failed_phases.is_empty());
}

#[tokio::test]
async fn test_checkpoint_gate() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));
    let t = 1_000_u64;

    meta.add_channel("ch-0");
    meta.set_channel_checkpoint(Position {
        channel: "ch-0".into(),
        timestamp: Timestamp::from_raw(t),
    });
    meta.add_segment(with_dml(dropped_segment(1, "ch-0", 2), t + 1));
    meta.add_segment(with_dml(dropped_segment(2, "ch-0", 2), t - 1));

    let gc = collector(&meta, option(&store));
    let stats = gc.clear_dropped_segments().await.unwrap();
    assert_eq!(stats.deferred_checkpoint, 1);
    assert_eq!(stats.reclaimed, 1);
    assert!(meta.segment(SegmentId::new(1)).is_some());
    assert!(meta.segment(SegmentId::new(2)).is_none());

    // Checkpoint advances past the segment's position
    meta.set_channel_checkpoint(Position {
        channel: "ch-0".into(),
        timestamp: Timestamp::from_raw(t + 1),
    });
    let stats = gc.clear_dropped_segments().await.unwrap();
    assert_eq!(stats.reclaimed, 1);
    assert!(meta.segment(SegmentId::new(1)).is_none());
}

#[tokio::test]
async fn test_checkpoint_ignored_for_removed_channel() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));

    meta.set_channel_checkpoint(Position {
        channel: "ch-gone".into(),
        timestamp: Timestamp::from_raw(10),
    });
    meta.add_segment(with_dml(dropped_segment(1, "ch-gone", 2), 500));

    let gc = collector(&meta, option(&store));
    let stats = gc.clear_dropped_segments().await.unwrap();
    assert_eq!(stats.reclaimed, 1);
    assert_eq!(stats.checkpoints_dropped, 1);
    assert!(!meta.has_channel_checkpoint("ch-gone"));
}

/// Oracle whose answer the test controls.
struct ScriptedFilter {
    indexed: Mutex<HashSet<SegmentId>>,
    calls: AtomicUsize,
}

#[async_trait]
impl IndexedSegmentFilter for ScriptedFilter {
    async fn filter_indexed(&self, segments: &[SegmentInfo]) -> CoreResult<HashSet<SegmentId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let indexed = self.indexed.lock();
        Ok(segments
            .iter()
            .map(|s| s.id)
            .filter(|id| indexed.contains(id))
            .collect())
    }
}

#[tokio::test]
async fn test_compaction_sources_wait_for_indexed_target() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));

    meta.add_segment(dropped_segment(1, "ch-0", 2));
    meta.add_segment(dropped_segment(2, "ch-0", 2));
    let mut target = segment(3, "ch-0");
    target.compaction_from = vec![SegmentId::new(1), SegmentId::new(2)];
    meta.add_segment(target);

    let filter = Arc::new(ScriptedFilter {
        indexed: Mutex::new(HashSet::new()),
        calls: AtomicUsize::new(0),
    });
    let gc = GarbageCollector::new(meta.clone(), filter.clone(), option(&store));

    let stats = gc.clear_dropped_segments().await.unwrap();
    assert_eq!(stats.deferred_compaction, 2);
    assert_eq!(stats.reclaimed, 0);
    assert_eq!(filter.calls.load(Ordering::SeqCst), 1);

    filter.indexed.lock().insert(SegmentId::new(3));
    let stats = gc.clear_dropped_segments().await.unwrap();
    assert_eq!(stats.reclaimed, 2);
    assert!(meta.segment(SegmentId::new(1)).is_none());
    assert!(meta.segment(SegmentId::new(2)).is_none());
    assert!(meta.segment(SegmentId::new(3)).is_some());
}

#[tokio::test]
async fn test_stats_log_of_live_segment_is_kept() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));

    let mut live = segment(5, "ch-0");
    live.statslogs = vec![FieldBinlog {
        field_id: FieldId::new(100),
        binlogs: vec![Binlog::with_path(stats_log(5, 2))],
    }];
    meta.add_segment(live);

    let rotated = stats_log(5, 1);
    let foreign = stats_log(6, 1);
    store.insert_object(&rotated, hours_ago(48));
    store.insert_object(stats_log(5, 2), hours_ago(48));
    store.insert_object(&foreign, hours_ago(48));

    let gc = collector(&meta, option(&store));
    let stats = gc.scan().await.unwrap();
    assert_eq!(stats.valid, 2);
    assert_eq!(stats.removed_keys, vec![foreign]);
    assert!(store.contains_key(&rotated));
}

fn finished_build(build: i64, files: &[&str]) -> SegmentIndex {
    SegmentIndex {
        collection_id: CollectionId::new(1),
        partition_id: PartitionId::new(10),
        segment_id: SegmentId::new(100),
        num_rows: 1000,
        index_id: IndexId::new(5),
        build_id: BuildId::new(build),
        node_id: 1,
        index_version: 2,
        state: IndexState::Finished,
        fail_reason: String::new(),
        deleted: false,
        index_file_keys: files.iter().map(|f| f.to_string()).collect(),
        create_time: Timestamp::ZERO,
    }
}

fn index_file(build: i64, version: i64, file: &str) -> String {
    paths::segment_index_file_path(
        ROOT,
        BuildId::new(build),
        version,
        PartitionId::new(10),
        SegmentId::new(100),
        file,
    )
}

#[tokio::test]
async fn test_index_files_reconciled_against_build_record() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));

    meta.add_segment_index(finished_build(7, &["1", "2", "3"]));
    for file in ["1", "2", "3", "4", "5"] {
        store.insert_object(index_file(7, 2, file), Utc::now());
    }

    let gc = collector(&meta, option(&store));
    let stats = gc.recycle_unused_index_files().await.unwrap();
    assert_eq!(stats.files_removed, 2);
    for file in ["1", "2", "3"] {
        assert!(store.contains_key(&index_file(7, 2, file)));
    }
    for file in ["4", "5"] {
        assert!(!store.contains_key(&index_file(7, 2, file)));
    }
}

#[tokio::test]
async fn test_orphan_build_removed_wholesale() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));

    for (version, file) in [(1, "a"), (1, "b"), (2, "a")] {
        store.insert_object(index_file(9, version, file), Utc::now());
    }
    store.insert_object(index_file(10, 1, "a"), Utc::now());
    let mut live = finished_build(10, &["a"]);
    live.index_version = 1;
    meta.add_segment_index(live);

    let builds_before = GC_INDEX_FILES_REMOVED.with_label_values(&["build"]).get();
    let gc = collector(&meta, option(&store));
    let stats = gc.recycle_unused_index_files().await.unwrap();
    assert_eq!(stats.orphan_builds_removed, 1);
    assert_eq!(store.keys(), vec![index_file(10, 1, "a")]);
    assert!(GC_INDEX_FILES_REMOVED.with_label_values(&["build"]).get() > builds_before);

    let prefix_removals: Vec<_> = store
        .get_call_history()
        .into_iter()
        .filter(|call| call.operation == MockOperation::DeletePrefix)
        .collect();
    assert_eq!(prefix_removals.len(), 1);
    assert!(prefix_removals[0].success);
    assert!(prefix_removals[0].key.starts_with(&format!("{}/index_files/9", ROOT)));

    // The surviving build matches its record, so a second pass removes nothing
    store.clear_history();
    let stats = gc.recycle_unused_index_files().await.unwrap();
    assert_eq!(stats.orphan_builds_removed, 0);
    assert!(store
        .get_call_history()
        .iter()
        .all(|call| call.operation != MockOperation::DeletePrefix
            && call.operation != MockOperation::Delete));
}

#[tokio::test]
async fn test_dropped_index_cascades_through_one_tick() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));
    let coll = CollectionId::new(1);

    meta.add_segment(segment(100, "ch-0"));
    meta.add_index(IndexDefinition::new(coll, FieldId::new(100), IndexId::new(5), "vec"));
    meta.add_segment_index(finished_build(7, &["1"]));
    store.insert_object(index_file(7, 2, "1"), Utc::now());
    meta.mark_index_deleted(coll, IndexId::new(5));

    let gc = collector(&meta, option(&store));
    let report = gc.run_once().await.unwrap();
    assert_eq!(report.index_meta.indexes_removed, 1);
    assert_eq!(report.index_meta.segment_indexes_removed, 1);
    assert_eq!(report.index_files.orphan_builds_removed, 1);
    assert_eq!(store.storage_size(), 0);
}

/// Delegating metadata that slows segment listing, counts overlapping ticks
/// and can fail selected reads.
struct InstrumentedMeta {
    inner: MemoryMeta,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    entries: AtomicUsize,
    fail_deleted_indexes: bool,
    fail_segment_lookup: Option<SegmentId>,
}

impl InstrumentedMeta {
    fn new(inner: MemoryMeta) -> Self {
        Self {
            inner,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            entries: AtomicUsize::new(0),
            fail_deleted_indexes: false,
            fail_segment_lookup: None,
        }
    }
}

#[async_trait]
impl DataCoordMeta for InstrumentedMeta {
    async fn list_segments(&self) -> CoreResult<Vec<SegmentInfo>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.entries.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.list_segments().await
    }

    async fn get_healthy_segment(&self, id: SegmentId) -> CoreResult<Option<SegmentInfo>> {
        if self.fail_segment_lookup == Some(id) {
            return Err(CoreError::internal("segment lookup unavailable"));
        }
        self.inner.get_healthy_segment(id).await
    }

    async fn healthy_segments_by_channel(&self, channel: &str) -> CoreResult<Vec<SegmentInfo>> {
        self.inner.healthy_segments_by_channel(channel).await
    }

    async fn drop_segment(&self, id: SegmentId) -> CoreResult<()> {
        self.inner.drop_segment(id).await
    }

    async fn channel_exists(&self, channel: &str) -> CoreResult<bool> {
        self.inner.channel_exists(channel).await
    }

    async fn channel_checkpoint(&self, channel: &str) -> CoreResult<Option<Position>> {
        self.inner.channel_checkpoint(channel).await
    }

    async fn drop_channel_checkpoint(&self, channel: &str) -> CoreResult<()> {
        self.inner.drop_channel_checkpoint(channel).await
    }

    async fn deleted_indexes(&self) -> CoreResult<Vec<IndexDefinition>> {
        if self.fail_deleted_indexes {
            return Err(CoreError::internal("index catalog unavailable"));
        }
        self.inner.deleted_indexes().await
    }

    async fn index_exists(&self, collection_id: CollectionId, index_id: IndexId) -> CoreResult<bool> {
        self.inner.index_exists(collection_id, index_id).await
    }

    async fn indexes_for_collection(
        &self,
        collection_id: CollectionId,
    ) -> CoreResult<Vec<IndexDefinition>> {
        self.inner.indexes_for_collection(collection_id).await
    }

    async fn remove_index(&self, collection_id: CollectionId, index_id: IndexId) -> CoreResult<()> {
        self.inner.remove_index(collection_id, index_id).await
    }

    async fn list_segment_indexes(&self) -> CoreResult<Vec<SegmentIndex>> {
        self.inner.list_segment_indexes().await
    }

    async fn segment_indexes_for(&self, segment_id: SegmentId) -> CoreResult<Vec<SegmentIndex>> {
        self.inner.segment_indexes_for(segment_id).await
    }

    async fn remove_segment_index(&self, record: &SegmentIndex) -> CoreResult<()> {
        self.inner.remove_segment_index(record).await
    }

    async fn clean_segment_index(
        &self,
        build_id: BuildId,
    ) -> CoreResult<(bool, Option<SegmentIndex>)> {
        self.inner.clean_segment_index(build_id).await
    }
}

#[tokio::test]
async fn test_overrunning_ticks_never_overlap() {
    let meta = Arc::new(InstrumentedMeta {
        delay: Duration::from_millis(30),
        ..InstrumentedMeta::new(MemoryMeta::new())
    });
    let store = Arc::new(MockObjectStore::new(ROOT).with_latency(Duration::from_millis(2)));
    let mut opt = option(&store);
    opt.check_interval = Duration::from_millis(10);

    let gc = GarbageCollector::new(
        meta.clone(),
        Arc::new(MetaIndexedFilter::new(meta.clone())),
        opt,
    );
    gc.start();
    tokio::time::sleep(Duration::from_millis(250)).await;
    gc.close().await;

    assert!(meta.entries.load(Ordering::SeqCst) >= 2);
    assert_eq!(meta.max_in_flight.load(Ordering::SeqCst), 1);

    // Nothing runs after close returns
    let entries = meta.entries.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(meta.entries.load(Ordering::SeqCst), entries);
}

#[tokio::test]
async fn test_index_meta_passes_fail_independently() {
    let inner = MemoryMeta::new();
    let coll = CollectionId::new(1);
    inner.add_index(IndexDefinition::new(coll, FieldId::new(100), IndexId::new(5), "vec"));
    inner.add_segment(segment(100, "ch-0"));
    inner.add_segment(segment(200, "ch-0"));

    let mut orphan = finished_build(7, &["1"]);
    orphan.segment_id = SegmentId::new(999);
    let mut unreadable = finished_build(8, &["1"]);
    unreadable.segment_id = SegmentId::new(200);
    inner.add_segment_index(orphan);
    inner.add_segment_index(unreadable);
    inner.add_segment_index(finished_build(9, &["1"]));

    let meta = Arc::new(InstrumentedMeta {
        fail_deleted_indexes: true,
        fail_segment_lookup: Some(SegmentId::new(200)),
        ..InstrumentedMeta::new(inner)
    });
    let store = Arc::new(MockObjectStore::new(ROOT));
    let gc = GarbageCollector::new(
        meta.clone(),
        Arc::new(MetaIndexedFilter::new(meta.clone())),
        option(&store),
    );

    let stats = gc.recycle_unused_index_meta().await.unwrap();
    assert_eq!(stats.failed_passes, vec!["definitions"]);
    assert_eq!(stats.segment_indexes_removed, 1);
    assert_eq!(stats.lookup_failures, 1);
    assert!(meta.inner.segment_index(BuildId::new(7)).is_none());
    assert!(meta.inner.segment_index(BuildId::new(8)).is_some());
    assert!(meta.inner.segment_index(BuildId::new(9)).is_some());

    let report = gc.run_once().await.unwrap();
    assert!(report.failed_phases.is_empty());
    assert_eq!(report.index_meta.failed_passes, vec!["definitions"]);
}

#[tokio::test]
async fn test_worker_without_store_never_runs() {
    let meta = Arc::new(MemoryMeta::new());
    meta.add_segment(dropped_segment(1, "ch-0", 48));

    let mut opt = GcOption::from_config(&GcConfig::default(), None);
    opt.check_interval = Duration::from_millis(5);
    opt.drop_tolerance = Duration::ZERO;
    let gc = collector(&meta, opt);

    gc.start();
    tokio::time::sleep(Duration::from_millis(30)).await;
    gc.close().await;
    gc.close().await;

    assert!(meta.segment(SegmentId::new(1)).is_some());
}

#[tokio::test]
async fn test_worker_reclaims_in_background() {
    let meta = Arc::new(MemoryMeta::new());
    let store = Arc::new(MockObjectStore::new(ROOT));
    meta.add_segment(dropped_segment(1, "ch-0", 48));
    store.insert_object(insert_log(1, 1), hours_ago(48));

    let mut opt = option(&store);
    opt.check_interval = Duration::from_millis(10);
    let gc = collector(&meta, opt);

    gc.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    gc.close().await;

    assert!(meta.segment(SegmentId::new(1)).is_none());
    assert_eq!(store.storage_size(), 0);
}
