//! Storage garbage collector
//!
//! Keeps three independently updated state spaces consistent: segment/index
//! metadata, per-channel checkpoints, and the objects persisted in object
//! storage. Nothing here holds a lock across stores; safety comes from
//! tolerance windows and multi-condition gates, and anything skipped is
//! retried on the next tick.
//!
//! ## Tick
//!
//! ```text
//!   ticker ──► clear dropped segments      (segment rows + their logs, checkpoints)
//!          ──► recycle index definitions   (soft-deleted → removed)
//!          ──► recycle segment indexes     (orphaned build records)
//!          ──► scan log prefixes           (objects unknown to metadata)
//!          ──► recycle index files         (stale / orphaned build output)
//! ```
//!
//! Exactly one worker runs per collector; phases run sequentially and a slow
//! tick delays the next one rather than overlapping it.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use akidb_core::GcConfig;
//! use akidb_datacoord::gc::{GarbageCollector, GcOption};
//! use akidb_datacoord::handler::MetaIndexedFilter;
//! use akidb_datacoord::meta::MemoryMeta;
//! use akidb_storage::MockObjectStore;
//!
//! # async fn example() {
//! let meta = Arc::new(MemoryMeta::new());
//! let store = Arc::new(MockObjectStore::new("files"));
//! let option = GcOption::from_config(&GcConfig::default(), Some(store));
//! let gc = GarbageCollector::new(meta.clone(), Arc::new(MetaIndexedFilter::new(meta)), option);
//!
//! gc.start();
//! // ...
//! gc.close().await;
//! # }
//! ```

mod index_files;
mod index_meta;
mod scanner;
mod segments;

pub use index_files::IndexFileStats;
pub use index_meta::IndexMetaStats;
pub use scanner::ScanStats;
pub use segments::SegmentGcStats;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use akidb_core::metrics::{GC_PHASE_DURATION, GC_TICKS};
use akidb_core::{CollectionId, CoreError, CoreResult, GcConfig, SegmentId};
use akidb_storage::ObjectStore;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::handler::IndexedSegmentFilter;
use crate::meta::DataCoordMeta;

/// Predicate telling whether a collection is still tracked by this coordinator.
pub type CollectionValidator = Arc<dyn Fn(CollectionId) -> bool + Send + Sync>;

/// Garbage collection options
#[derive(Clone)]
pub struct GcOption {
    /// Object storage client; the worker refuses to start without one.
    pub store: Option<Arc<dyn ObjectStore>>,
    pub enabled: bool,
    pub check_interval: Duration,
    /// How long an object unknown to metadata survives before deletion.
    pub missing_tolerance: Duration,
    /// How long a dropped segment survives before reclamation.
    pub drop_tolerance: Duration,
    /// Scopes the storage scan; `None` accepts every collection.
    pub collection_validator: Option<CollectionValidator>,
}

impl GcOption {
    pub fn from_config(config: &GcConfig, store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            store,
            enabled: config.enabled,
            check_interval: config.check_interval(),
            missing_tolerance: config.missing_tolerance(),
            drop_tolerance: config.drop_tolerance(),
            collection_validator: None,
        }
    }

    #[must_use]
    pub fn with_collection_validator(
        mut self,
        validator: impl Fn(CollectionId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.collection_validator = Some(Arc::new(validator));
        self
    }
}

impl fmt::Debug for GcOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcOption")
            .field("has_store", &self.store.is_some())
            .field("enabled", &self.enabled)
            .field("check_interval", &self.check_interval)
            .field("missing_tolerance", &self.missing_tolerance)
            .field("drop_tolerance", &self.drop_tolerance)
            .field("has_collection_validator", &self.collection_validator.is_some())
            .finish()
    }
}

/// Outcome of one full tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub segments: SegmentGcStats,
    pub index_meta: IndexMetaStats,
    pub scan: ScanStats,
    pub index_files: IndexFileStats,
    /// Phases that aborted early; they are retried on the next tick.
    pub failed_phases: Vec<&'static str>,
}

/// Shared state between the collector handle and its worker.
pub(crate) struct GcCore {
    meta: Arc<dyn DataCoordMeta>,
    handler: Arc<dyn IndexedSegmentFilter>,
    option: GcOption,
    rated: RateLimitedLog,
}

impl GcCore {
    fn store(&self) -> CoreResult<&Arc<dyn ObjectStore>> {
        self.option
            .store
            .as_ref()
            .ok_or_else(|| CoreError::invalid_state("garbage collector has no object store"))
    }

    fn collection_valid(&self, collection_id: CollectionId) -> bool {
        self.option
            .collection_validator
            .as_ref()
            .map_or(true, |validator| validator(collection_id))
    }

    async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        match timed("segments", self.clear_dropped_segments()).await {
            Ok(stats) => report.segments = stats,
            Err(e) => fail_phase(&mut report, "segments", &e),
        }
        match timed("index_meta", self.recycle_unused_index_meta()).await {
            Ok(stats) => report.index_meta = stats,
            Err(e) => fail_phase(&mut report, "index_meta", &e),
        }
        match timed("scan", self.scan()).await {
            Ok(stats) => report.scan = stats,
            Err(e) => fail_phase(&mut report, "scan", &e),
        }
        match timed("index_files", self.recycle_unused_index_files()).await {
            Ok(stats) => report.index_files = stats,
            Err(e) => fail_phase(&mut report, "index_files", &e),
        }

        GC_TICKS.inc();
        report
    }
}

async fn timed<T>(
    phase: &'static str,
    fut: impl std::future::Future<Output = CoreResult<T>>,
) -> CoreResult<T> {
    let _timer = GC_PHASE_DURATION.with_label_values(&[phase]).start_timer();
    fut.await
}

fn fail_phase(report: &mut TickReport, phase: &'static str, error: &CoreError) {
    tracing::warn!(phase, error = %error, "GC phase aborted, will retry next tick");
    report.failed_phases.push(phase);
}

/// Storage garbage collector with a single background worker.
pub struct GarbageCollector {
    core: Arc<GcCore>,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GarbageCollector {
    pub fn new(
        meta: Arc<dyn DataCoordMeta>,
        handler: Arc<dyn IndexedSegmentFilter>,
        option: GcOption,
    ) -> Self {
        tracing::info!(
            enabled = option.enabled,
            interval = ?option.check_interval,
            missing_tolerance = ?option.missing_tolerance,
            drop_tolerance = ?option.drop_tolerance,
            "GC with option"
        );

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            core: Arc::new(GcCore {
                meta,
                handler,
                option,
                rated: RateLimitedLog::new(Duration::from_secs(60)),
            }),
            started: AtomicBool::new(false),
            shutdown_tx,
            worker: Mutex::new(None),
        }
    }

    /// Launch the background worker.
    ///
    /// No-op when GC is disabled, when no object store is configured, after
    /// `close`, or when already started. Must be called inside a tokio runtime.
    pub fn start(&self) {
        if !self.core.option.enabled {
            return;
        }
        if self.core.option.store.is_none() {
            tracing::warn!("DataCoord gc enabled, but object store client is not provided");
            return;
        }
        // Held across the shutdown check so `close` either sees the handle or
        // start sees the shutdown flag.
        let mut worker = self.worker.lock();
        if *self.shutdown_tx.borrow() {
            return;
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Garbage collector already running");
            return;
        }

        let core = Arc::clone(&self.core);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *worker = Some(tokio::spawn(work(core, shutdown_rx)));
        tracing::info!(
            "Garbage collector started (interval: {:?})",
            self.core.option.check_interval
        );
    }

    /// Signal the worker to stop and wait until it has exited.
    ///
    /// An in-flight tick is cancelled, aborting its outstanding storage calls.
    /// Idempotent; concurrent callers all return after the worker is gone.
    pub async fn close(&self) {
        self.shutdown_tx.send_replace(true);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Garbage collector worker panicked");
            }
        }
        // The worker owns the only receiver; callers that lost the race for
        // the handle wait here until it is dropped.
        self.shutdown_tx.closed().await;
    }

    /// Run one full tick synchronously, outside of the worker.
    ///
    /// # Errors
    ///
    /// `CoreError::InvalidState` when no object store is configured.
    pub async fn run_once(&self) -> CoreResult<TickReport> {
        self.core.store()?;
        Ok(self.core.run_tick().await)
    }

    /// Reclaim dropped segments whose gates have all passed.
    pub async fn clear_dropped_segments(&self) -> CoreResult<SegmentGcStats> {
        self.core.clear_dropped_segments().await
    }

    /// Remove soft-deleted index definitions and orphaned build records.
    pub async fn recycle_unused_index_meta(&self) -> CoreResult<IndexMetaStats> {
        self.core.recycle_unused_index_meta().await
    }

    /// Delete log objects that metadata does not know about.
    pub async fn scan(&self) -> CoreResult<ScanStats> {
        self.core.scan().await
    }

    /// Delete stale or orphaned index build output.
    pub async fn recycle_unused_index_files(&self) -> CoreResult<IndexFileStats> {
        self.core.recycle_unused_index_files().await
    }
}

async fn work(core: Arc<GcCore>, mut shutdown: watch::Receiver<bool>) {
    let interval = core.option.check_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            tracing::warn!("garbage collector quit");
            return;
        }
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    report = core.run_tick() => {
                        tracing::debug!(?report, "GC tick complete");
                    }
                    _ = shutdown.changed() => {
                        tracing::warn!("GC tick cancelled by shutdown");
                        return;
                    }
                }
            }
            _ = shutdown.changed() => {
                tracing::warn!("garbage collector quit");
                return;
            }
        }
    }
}

/// Suppresses repeats of the same (group, segment) message within a period.
pub(crate) struct RateLimitedLog {
    period: Duration,
    last: Mutex<HashMap<(&'static str, SegmentId), Instant>>,
}

impl RateLimitedLog {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// True when a message for `(group, segment_id)` may be emitted now.
    pub(crate) fn allow(&self, group: &'static str, segment_id: SegmentId) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        last.retain(|_, at| now.duration_since(*at) < self.period);
        match last.get(&(group, segment_id)) {
            Some(_) => false,
            None => {
                last.insert((group, segment_id), now);
                true
            }
        }
    }
}

/// Age of an object relative to `now`, zero for mtimes in the future.
pub(crate) fn object_age(
    now: chrono::DateTime<chrono::Utc>,
    last_modified: chrono::DateTime<chrono::Utc>,
) -> Duration {
    (now - last_modified).to_std().unwrap_or(Duration::ZERO)
}
