//! Central metrics registry for the data coordinator garbage collector
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

// ===== Orchestrator Metrics =====

/// Total number of completed GC ticks
pub static GC_TICKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("akidb_gc_ticks_total", "Total number of completed GC ticks")
        .expect("Failed to register GC tick counter")
});

/// Duration of each GC phase
pub static GC_PHASE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "akidb_gc_phase_duration_seconds",
        "GC phase duration in seconds",
        &["phase"],
        // Buckets: 10ms .. 10min; full scans of large buckets are slow
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]
    )
    .expect("Failed to register GC phase duration histogram")
});

// ===== Object Scanner Metrics =====

/// Objects visited by the scanner, by log prefix and outcome
pub static GC_SCANNED_OBJECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_gc_scanned_objects_total",
        "Objects visited by the storage scanner",
        &["prefix", "outcome"]
    )
    .expect("Failed to register GC scanned objects counter")
});

// ===== Segment Reclaimer Metrics =====

/// Dropped segments whose metadata row was removed
pub static GC_SEGMENTS_RECLAIMED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "akidb_gc_segments_reclaimed_total",
        "Dropped segments physically reclaimed"
    )
    .expect("Failed to register GC reclaimed segments counter")
});

/// Dropped segments left for a later tick, by gate
pub static GC_SEGMENTS_DEFERRED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_gc_segments_deferred_total",
        "Dropped segments deferred to a later tick",
        &["reason"]
    )
    .expect("Failed to register GC deferred segments counter")
});

// ===== Index Metrics =====

/// Index metadata records removed, by kind (definition / segment_index)
pub static GC_INDEX_META_REMOVED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_gc_index_meta_removed_total",
        "Index metadata records physically removed",
        &["kind"]
    )
    .expect("Failed to register GC index meta counter")
});

/// Index files removed from object storage, per file or per orphan build prefix
pub static GC_INDEX_FILES_REMOVED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_gc_index_files_removed_total",
        "Stale index files removed from object storage",
        &["scope"]
    )
    .expect("Failed to register GC index files counter")
});
