//! Dropped segment reclamation.

use std::collections::{HashMap, HashSet};

use akidb_core::metrics::{GC_SEGMENTS_DEFERRED, GC_SEGMENTS_RECLAIMED};
use akidb_core::{CoreResult, SegmentId, SegmentInfo, Timestamp};
use chrono::Utc;
use serde::Serialize;

use super::GcCore;

/// Counters for one pass of the segment reclaimer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentGcStats {
    pub dropped: usize,
    pub reclaimed: usize,
    pub deferred_tolerance: usize,
    pub deferred_checkpoint: usize,
    pub deferred_compaction: usize,
    /// Segments whose logs could not all be removed; their rows are kept.
    pub removal_failed: usize,
    pub checkpoints_dropped: usize,
}

impl GcCore {
    pub(super) async fn clear_dropped_segments(&self) -> CoreResult<SegmentGcStats> {
        let mut stats = SegmentGcStats::default();
        let all = self.meta.list_segments().await?;

        let mut compact_to: HashMap<SegmentId, &SegmentInfo> = HashMap::new();
        for segment in &all {
            for from in &segment.compaction_from {
                compact_to.insert(*from, segment);
            }
        }
        let drops: Vec<&SegmentInfo> = all.iter().filter(|s| s.is_dropped()).collect();
        stats.dropped = drops.len();
        if drops.is_empty() {
            return Ok(stats);
        }

        let mut targets: Vec<SegmentInfo> = Vec::new();
        let mut seen = HashSet::new();
        for segment in &drops {
            if let Some(to) = compact_to.get(&segment.id) {
                if seen.insert(to.id) {
                    targets.push((*to).clone());
                }
            }
        }
        let indexed = if targets.is_empty() {
            HashSet::new()
        } else {
            match self.handler.filter_indexed(&targets).await {
                Ok(indexed) => indexed,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to check index state of compaction targets");
                    HashSet::new()
                }
            }
        };

        let now = Utc::now();
        let mut checkpoints: HashMap<String, Timestamp> = HashMap::new();
        let mut cleaned_channels: HashSet<String> = HashSet::new();

        for segment in drops {
            if segment.dropped_at.age(now) < self.option.drop_tolerance {
                stats.deferred_tolerance += 1;
                GC_SEGMENTS_DEFERRED.with_label_values(&["tolerance"]).inc();
                continue;
            }

            let channel = segment.insert_channel.as_str();
            let channel_live = match self.meta.channel_exists(channel).await {
                Ok(live) => live,
                Err(e) => {
                    tracing::warn!(channel, error = %e, "failed to check channel, assuming live");
                    true
                }
            };
            if channel_live {
                let checkpoint = match checkpoints.get(channel) {
                    Some(ts) => *ts,
                    None => {
                        let ts = self.checkpoint_of(channel).await;
                        checkpoints.insert(channel.to_string(), ts);
                        ts
                    }
                };
                if segment.dml_timestamp() > checkpoint {
                    if self.rated.allow("checkpoint", segment.id) {
                        tracing::info!(
                            segment_id = %segment.id,
                            channel,
                            segment_ts = %segment.dml_timestamp(),
                            checkpoint_ts = %checkpoint,
                            "dropped segment dml position is after channel checkpoint, skip meta gc"
                        );
                    }
                    stats.deferred_checkpoint += 1;
                    GC_SEGMENTS_DEFERRED.with_label_values(&["checkpoint"]).inc();
                    continue;
                }
            }

            if let Some(to) = compact_to.get(&segment.id) {
                if !indexed.contains(&to.id) {
                    if self.rated.allow("compaction", segment.id) {
                        tracing::info!(
                            segment_id = %segment.id,
                            compaction_to = %to.id,
                            "skipping GC when compact target segment is not indexed"
                        );
                    }
                    stats.deferred_compaction += 1;
                    GC_SEGMENTS_DEFERRED.with_label_values(&["compaction"]).inc();
                    continue;
                }
            }

            if self.remove_logs(segment).await {
                match self.meta.drop_segment(segment.id).await {
                    Ok(()) => {
                        tracing::info!(
                            segment_id = %segment.id,
                            collection_id = %segment.collection_id,
                            "GC segment meta drop segment"
                        );
                        stats.reclaimed += 1;
                        GC_SEGMENTS_RECLAIMED.inc();
                    }
                    Err(e) => {
                        tracing::warn!(segment_id = %segment.id, error = %e, "failed to drop segment meta");
                        stats.removal_failed += 1;
                    }
                }
            } else {
                stats.removal_failed += 1;
            }

            if !cleaned_channels.contains(channel) && self.channel_is_empty(channel).await {
                cleaned_channels.insert(channel.to_string());
                match self.meta.drop_channel_checkpoint(channel).await {
                    Ok(()) => {
                        tracing::info!(channel, "GC channel checkpoint of empty removed channel");
                        stats.checkpoints_dropped += 1;
                    }
                    Err(e) => {
                        tracing::warn!(channel, error = %e, "failed to drop channel check point during segment garbage collection");
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn checkpoint_of(&self, channel: &str) -> Timestamp {
        match self.meta.channel_checkpoint(channel).await {
            Ok(position) => position.map_or(Timestamp::ZERO, |p| p.timestamp),
            Err(e) => {
                tracing::warn!(channel, error = %e, "failed to read channel checkpoint");
                Timestamp::ZERO
            }
        }
    }

    /// No healthy segment left and no channel record.
    async fn channel_is_empty(&self, channel: &str) -> bool {
        let no_segments = match self.meta.healthy_segments_by_channel(channel).await {
            Ok(segments) => segments.is_empty(),
            Err(_) => false,
        };
        no_segments && matches!(self.meta.channel_exists(channel).await, Ok(false))
    }

    /// Remove every log object of `segment`. Missing objects count as removed.
    ///
    /// Returns false when any removal failed for another reason.
    async fn remove_logs(&self, segment: &SegmentInfo) -> bool {
        let Ok(store) = self.store() else {
            return false;
        };

        let mut ok = true;
        for log in segment.all_logs() {
            match store.delete(&log.log_path).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(path = %log.log_path, "log already absent");
                }
                Err(e) => {
                    tracing::warn!(
                        segment_id = %segment.id,
                        path = %log.log_path,
                        error = %e,
                        "failed to remove segment log"
                    );
                    ok = false;
                }
            }
        }
        ok
    }
}
