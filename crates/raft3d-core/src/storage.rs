use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::command::LogEntry;
use crate::error::StorageError;

/// Position of a snapshot in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Index of the last entry folded into the snapshot.
    pub last_index: u64,
    /// Term of that entry.
    pub last_term: u64,
}

impl SnapshotMeta {
    pub fn new(last_index: u64, last_term: u64) -> Self {
        Self {
            last_index,
            last_term,
        }
    }
}

/// Destination for a snapshot being persisted.
///
/// Bytes written are only visible to readers after `close` succeeds;
/// `cancel` discards them.
pub trait SnapshotSink: Write {
    fn meta(&self) -> SnapshotMeta;

    fn cancel(&mut self);

    fn close(&mut self) -> Result<(), StorageError>;
}

/// Durable storage for committed log entries.
pub trait LogStore: Send + Sync {
    /// Append an entry at `last_index() + 1`.
    /// Returns Ok(false) if an entry with that index already exists.
    fn append(&self, entry: LogEntry) -> Result<bool, StorageError>;

    /// Entries with index > `since_index`, in index order, at most `limit`.
    fn entries_since(&self, since_index: u64, limit: usize) -> Result<Vec<LogEntry>, StorageError>;

    /// Lowest index still held, or `last_index() + 1` when the log is empty.
    fn first_index(&self) -> Result<u64, StorageError>;

    /// Highest index ever appended or compacted through; 0 for a new log.
    fn last_index(&self) -> Result<u64, StorageError>;

    /// Drop every entry with index <= `index`. Afterwards
    /// `last_index() >= index`.
    fn compact_through(&self, index: u64) -> Result<(), StorageError>;
}

/// Durable storage for the most recent snapshot.
pub trait SnapshotStore: Send + Sync {
    type Sink: SnapshotSink;

    /// Open a sink for a new snapshot. It replaces the current one on close.
    fn create(&self, meta: SnapshotMeta) -> Result<Self::Sink, StorageError>;

    fn latest(&self) -> Result<Option<(SnapshotMeta, Vec<u8>)>, StorageError>;
}

// In-memory implementations for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct LogInner {
        entries: BTreeMap<u64, LogEntry>,
        last_index: u64,
    }

    /// In-memory log store for testing.
    #[derive(Default)]
    pub struct InMemoryLogStore {
        inner: RwLock<LogInner>,
    }

    impl InMemoryLogStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl LogStore for InMemoryLogStore {
        fn append(&self, entry: LogEntry) -> Result<bool, StorageError> {
            let mut inner = self.inner.write().unwrap();
            if entry.index <= inner.last_index {
                return Ok(false);
            }
            if entry.index != inner.last_index + 1 {
                return Err(StorageError::NonContiguous {
                    last: inner.last_index,
                    got: entry.index,
                });
            }
            inner.last_index = entry.index;
            inner.entries.insert(entry.index, entry);
            Ok(true)
        }

        fn entries_since(
            &self,
            since_index: u64,
            limit: usize,
        ) -> Result<Vec<LogEntry>, StorageError> {
            let inner = self.inner.read().unwrap();
            Ok(inner
                .entries
                .range(since_index.saturating_add(1)..)
                .take(limit)
                .map(|(_, e)| e.clone())
                .collect())
        }

        fn first_index(&self) -> Result<u64, StorageError> {
            let inner = self.inner.read().unwrap();
            Ok(inner
                .entries
                .keys()
                .next()
                .copied()
                .unwrap_or(inner.last_index + 1))
        }

        fn last_index(&self) -> Result<u64, StorageError> {
            Ok(self.inner.read().unwrap().last_index)
        }

        fn compact_through(&self, index: u64) -> Result<(), StorageError> {
            let mut inner = self.inner.write().unwrap();
            inner.entries = inner.entries.split_off(&(index + 1));
            inner.last_index = inner.last_index.max(index);
            Ok(())
        }
    }

    type Slot = Arc<RwLock<Option<(SnapshotMeta, Vec<u8>)>>>;

    /// In-memory snapshot store for testing.
    #[derive(Default)]
    pub struct InMemorySnapshotStore {
        current: Slot,
    }

    impl InMemorySnapshotStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    pub struct InMemorySnapshotSink {
        meta: SnapshotMeta,
        buffer: Vec<u8>,
        canceled: bool,
        target: Slot,
    }

    impl Write for InMemorySnapshotSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SnapshotSink for InMemorySnapshotSink {
        fn meta(&self) -> SnapshotMeta {
            self.meta
        }

        fn cancel(&mut self) {
            self.canceled = true;
            self.buffer.clear();
        }

        fn close(&mut self) -> Result<(), StorageError> {
            if self.canceled {
                return Err(StorageError::Canceled);
            }
            let data = std::mem::take(&mut self.buffer);
            *self.target.write().unwrap() = Some((self.meta, data));
            Ok(())
        }
    }

    impl SnapshotStore for InMemorySnapshotStore {
        type Sink = InMemorySnapshotSink;

        fn create(&self, meta: SnapshotMeta) -> Result<Self::Sink, StorageError> {
            Ok(InMemorySnapshotSink {
                meta,
                buffer: Vec::new(),
                canceled: false,
                target: self.current.clone(),
            })
        }

        fn latest(&self) -> Result<Option<(SnapshotMeta, Vec<u8>)>, StorageError> {
            Ok(self.current.read().unwrap().clone())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn entry(index: u64) -> LogEntry {
            LogEntry::new(index, 1, format!("entry-{index}").into_bytes())
        }

        #[test]
        fn test_log_store_append() {
            let store = InMemoryLogStore::new();

            assert!(store.append(entry(1)).unwrap());
            assert!(store.append(entry(2)).unwrap());
            // Existing index is a duplicate
            assert!(!store.append(entry(2)).unwrap());
            // Gap is an error
            assert!(store.append(entry(4)).is_err());

            assert_eq!(store.last_index().unwrap(), 2);
        }

        #[test]
        fn test_log_store_compaction() {
            let store = InMemoryLogStore::new();
            for i in 1..=5 {
                store.append(entry(i)).unwrap();
            }

            store.compact_through(3).unwrap();

            assert_eq!(store.first_index().unwrap(), 4);
            assert_eq!(store.last_index().unwrap(), 5);
            let rest = store.entries_since(0, 10).unwrap();
            assert_eq!(rest.iter().map(|e| e.index).collect::<Vec<_>>(), vec![4, 5]);

            // Compacting past the end moves last_index forward.
            store.compact_through(9).unwrap();
            assert_eq!(store.first_index().unwrap(), 10);
            assert_eq!(store.last_index().unwrap(), 9);
        }

        #[test]
        fn test_snapshot_sink_commit_and_cancel() {
            let store = InMemorySnapshotStore::new();

            let mut sink = store.create(SnapshotMeta::new(3, 1)).unwrap();
            sink.write_all(b"abc").unwrap();
            sink.cancel();
            assert!(sink.close().is_err());
            assert!(store.latest().unwrap().is_none());

            let mut sink = store.create(SnapshotMeta::new(4, 1)).unwrap();
            sink.write_all(b"state").unwrap();
            sink.close().unwrap();

            let (meta, data) = store.latest().unwrap().unwrap();
            assert_eq!(meta.last_index, 4);
            assert_eq!(data, b"state");
        }
    }
}
