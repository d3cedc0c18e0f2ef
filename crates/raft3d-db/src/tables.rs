use redb::TableDefinition;

use raft3d_core::StorageError;

/// Table for committed log entries.
/// Key: log index
/// Value: serialized LogEntry as bytes
pub const LOG_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("log");

/// Table for log bookkeeping that outlives compaction.
/// Key: one of the `META_*` names
/// Value: u64
pub const LOG_META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("log_meta");

/// Highest index appended or compacted through.
pub const META_LAST_INDEX: &str = "last_index";

/// Table holding the latest snapshot.
/// Key: `SNAPSHOT_META` or `SNAPSHOT_DATA`
/// Value: serialized SnapshotMeta, or the snapshot document
pub const SNAPSHOT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshot");

pub const SNAPSHOT_META: &str = "meta";
pub const SNAPSHOT_DATA: &str = "data";

/// Map any redb or serde error into a storage error.
pub(crate) fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}
