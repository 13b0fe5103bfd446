//! Storage key layout for segment logs and index build output.
//!
//! ```text
//! <root>/insert_log/<collection>/<partition>/<segment>/<field>/<log>
//! <root>/stats_log/<collection>/<partition>/<segment>/<field>/<log>
//! <root>/delta_log/<collection>/<partition>/<segment>/<log>
//! <root>/index_files/<build>/<version>/<partition>/<segment>/<file_key>
//! ```

use std::fmt;

use akidb_core::{
    BuildId, CollectionId, CoreError, CoreResult, FieldId, LogId, PartitionId, SegmentId,
};

pub const INSERT_LOG_PREFIX: &str = "insert_log";
pub const STATS_LOG_PREFIX: &str = "stats_log";
pub const DELTA_LOG_PREFIX: &str = "delta_log";
pub const SEGMENT_INDEX_PREFIX: &str = "index_files";

/// The three segment log families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Insert,
    Stats,
    Delta,
}

impl LogKind {
    pub const ALL: [LogKind; 3] = [LogKind::Insert, LogKind::Stats, LogKind::Delta];

    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            LogKind::Insert => INSERT_LOG_PREFIX,
            LogKind::Stats => STATS_LOG_PREFIX,
            LogKind::Delta => DELTA_LOG_PREFIX,
        }
    }

    /// Number of components after the root, including the family prefix.
    fn depth(self) -> usize {
        match self {
            LogKind::Insert | LogKind::Stats => 6,
            LogKind::Delta => 5,
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Join key components with `/`, skipping empty ones.
#[must_use]
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// `<root>/<family>` without trailing slash.
#[must_use]
pub fn log_root(root: &str, kind: LogKind) -> String {
    join(&[root, kind.prefix()])
}

/// `<root>/index_files` without trailing slash.
#[must_use]
pub fn segment_index_root(root: &str) -> String {
    join(&[root, SEGMENT_INDEX_PREFIX])
}

/// Insert or stats log key.
#[must_use]
pub fn field_log_path(
    root: &str,
    kind: LogKind,
    collection: CollectionId,
    partition: PartitionId,
    segment: SegmentId,
    field: FieldId,
    log: LogId,
) -> String {
    join(&[
        root,
        kind.prefix(),
        &collection.to_string(),
        &partition.to_string(),
        &segment.to_string(),
        &field.to_string(),
        &log.to_string(),
    ])
}

/// Delta log key.
#[must_use]
pub fn delta_log_path(
    root: &str,
    collection: CollectionId,
    partition: PartitionId,
    segment: SegmentId,
    log: LogId,
) -> String {
    join(&[
        root,
        DELTA_LOG_PREFIX,
        &collection.to_string(),
        &partition.to_string(),
        &segment.to_string(),
        &log.to_string(),
    ])
}

/// Canonical key of one index build output file.
#[must_use]
pub fn segment_index_file_path(
    root: &str,
    build: BuildId,
    index_version: i64,
    partition: PartitionId,
    segment: SegmentId,
    file_key: &str,
) -> String {
    join(&[
        root,
        SEGMENT_INDEX_PREFIX,
        &build.to_string(),
        &index_version.to_string(),
        &partition.to_string(),
        &segment.to_string(),
        file_key,
    ])
}

fn strip_root<'a>(root: &str, key: &'a str) -> CoreResult<&'a str> {
    let rest = key
        .strip_prefix(root)
        .ok_or_else(|| CoreError::invalid_path(key, format!("not under root `{}`", root)))?;
    Ok(rest.trim_start_matches('/'))
}

/// Derive the owning segment from a log key.
///
/// # Errors
///
/// `CoreError::InvalidPath` when the key is outside `root`, is not a log key,
/// has the wrong number of components, or carries a non-numeric segment id.
pub fn parse_segment_id_from_binlog(root: &str, key: &str) -> CoreResult<SegmentId> {
    let rest = strip_root(root, key)?;
    let parts: Vec<&str> = rest.split('/').collect();

    let kind = parts
        .first()
        .and_then(|p| LogKind::from_prefix(p))
        .ok_or_else(|| CoreError::invalid_path(key, "unknown log family"))?;
    if parts.len() != kind.depth() || parts.iter().any(|p| p.is_empty()) {
        return Err(CoreError::invalid_path(
            key,
            format!("expected {} components for {}", kind.depth(), kind),
        ));
    }

    parts[3]
        .parse()
        .map_err(|_| CoreError::invalid_path(key, "segment id is not numeric"))
}

/// Parse the collection id out of a first-level sub-prefix such as
/// `<root>/insert_log/<collection>/`.
///
/// # Errors
///
/// `CoreError::InvalidPath` when `key` is not directly under `parent` or the
/// component is not numeric.
pub fn parse_collection_prefix(parent: &str, key: &str) -> CoreResult<CollectionId> {
    parse_first_component(parent, key, "collection id")
}

/// Parse the build id out of `<root>/index_files/<build>/`.
///
/// # Errors
///
/// Same as [`parse_collection_prefix`].
pub fn parse_build_id_from_prefix(index_root: &str, key: &str) -> CoreResult<BuildId> {
    parse_first_component(index_root, key, "build id")
}

fn parse_first_component<T: std::str::FromStr>(
    parent: &str,
    key: &str,
    what: &str,
) -> CoreResult<T> {
    let rest = key
        .strip_prefix(parent)
        .ok_or_else(|| CoreError::invalid_path(key, format!("not under `{}`", parent)))?
        .trim_matches('/');
    if rest.is_empty() || rest.contains('/') {
        return Err(CoreError::invalid_path(
            key,
            format!("expected a single {} component", what),
        ));
    }
    rest.parse()
        .map_err(|_| CoreError::invalid_path(key, format!("{} is not numeric", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_log_path_layout() {
        let key = field_log_path(
            "files",
            LogKind::Insert,
            CollectionId::new(1),
            PartitionId::new(2),
            SegmentId::new(3),
            FieldId::new(100),
            LogId::new(9),
        );
        assert_eq!(key, "files/insert_log/1/2/3/100/9");
        assert_eq!(
            parse_segment_id_from_binlog("files", &key).unwrap(),
            SegmentId::new(3)
        );
    }

    #[test]
    fn test_delta_log_has_no_field_component() {
        let key = delta_log_path(
            "files",
            CollectionId::new(1),
            PartitionId::new(2),
            SegmentId::new(33),
            LogId::new(9),
        );
        assert_eq!(key, "files/delta_log/1/2/33/9");
        assert_eq!(
            parse_segment_id_from_binlog("files", &key).unwrap(),
            SegmentId::new(33)
        );
    }

    #[test]
    fn test_parse_segment_id_rejects_malformed_keys() {
        for key in [
            "files/insert_log/1/2/3/100",
            "files/insert_log/1/2/abc/100/9",
            "files/stats_log/1/2/3/100/9/extra",
            "files/delta_log/1/2/3/4/5",
            "files/unknown_log/1/2/3/4/5",
            "other/insert_log/1/2/3/100/9",
        ] {
            let err = parse_segment_id_from_binlog("files", key).unwrap_err();
            assert!(matches!(err, CoreError::InvalidPath { .. }), "{key}");
        }
    }

    #[test]
    fn test_empty_root() {
        let key = field_log_path(
            "",
            LogKind::Stats,
            CollectionId::new(1),
            PartitionId::new(2),
            SegmentId::new(3),
            FieldId::new(4),
            LogId::new(5),
        );
        assert_eq!(key, "stats_log/1/2/3/4/5");
        assert_eq!(
            parse_segment_id_from_binlog("", &key).unwrap(),
            SegmentId::new(3)
        );
    }

    #[test]
    fn test_parse_collection_and_build_prefixes() {
        assert_eq!(
            parse_collection_prefix("files/insert_log", "files/insert_log/42/").unwrap(),
            CollectionId::new(42)
        );
        assert!(parse_collection_prefix("files/insert_log", "files/insert_log/x/").is_err());
        assert!(parse_collection_prefix("files/insert_log", "files/insert_log/1/2/").is_err());

        assert_eq!(
            parse_build_id_from_prefix("files/index_files", "files/index_files/555/").unwrap(),
            BuildId::new(555)
        );
    }

    #[test]
    fn test_segment_index_file_path() {
        let key = segment_index_file_path(
            "files",
            BuildId::new(7),
            2,
            PartitionId::new(10),
            SegmentId::new(100),
            "HNSW_3",
        );
        assert_eq!(key, "files/index_files/7/2/10/100/HNSW_3");
    }
}
