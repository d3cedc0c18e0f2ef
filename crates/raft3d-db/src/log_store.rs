use std::sync::Arc;

use redb::{Database, ReadableTable};

use raft3d_core::{LogEntry, LogStore, StorageError};

use crate::tables::{db_err, LOG_META_TABLE, LOG_TABLE, META_LAST_INDEX};

/// redb implementation of LogStore.
pub struct RedbLogStore {
    db: Arc<Database>,
}

impl RedbLogStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            // Create tables if they don't exist
            let _ = write_txn.open_table(LOG_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(LOG_META_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

impl LogStore for RedbLogStore {
    fn append(&self, entry: LogEntry) -> Result<bool, StorageError> {
        let value = serde_json::to_vec(&entry).map_err(db_err)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut meta = write_txn.open_table(LOG_META_TABLE).map_err(db_err)?;
            let last = meta
                .get(META_LAST_INDEX)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(0);

            // Already have it
            if entry.index <= last {
                return Ok(false);
            }
            if entry.index != last + 1 {
                return Err(StorageError::NonContiguous {
                    last,
                    got: entry.index,
                });
            }

            let mut log = write_txn.open_table(LOG_TABLE).map_err(db_err)?;
            log.insert(entry.index, value.as_slice()).map_err(db_err)?;
            meta.insert(META_LAST_INDEX, entry.index).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(true)
    }

    fn entries_since(&self, since_index: u64, limit: usize) -> Result<Vec<LogEntry>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(LOG_TABLE).map_err(db_err)?;

        let mut entries = Vec::new();
        for item in table
            .range(since_index.saturating_add(1)..)
            .map_err(db_err)?
            .take(limit)
        {
            let (_, value) = item.map_err(db_err)?;
            let entry: LogEntry = serde_json::from_slice(value.value()).map_err(db_err)?;
            entries.push(entry);
        }

        Ok(entries)
    }

    fn first_index(&self) -> Result<u64, StorageError> {
        let first = {
            let read_txn = self.db.begin_read().map_err(db_err)?;
            let table = read_txn.open_table(LOG_TABLE).map_err(db_err)?;
            let first = table.first().map_err(db_err)?.map(|(k, _)| k.value());
            first
        };

        match first {
            Some(index) => Ok(index),
            None => Ok(self.last_index()? + 1),
        }
    }

    fn last_index(&self) -> Result<u64, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let meta = read_txn.open_table(LOG_META_TABLE).map_err(db_err)?;
        let last = meta
            .get(META_LAST_INDEX)
            .map_err(db_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        Ok(last)
    }

    fn compact_through(&self, index: u64) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let removed;
        {
            let mut log = write_txn.open_table(LOG_TABLE).map_err(db_err)?;
            let mut stale = Vec::new();
            for item in log.range(..=index).map_err(db_err)? {
                let (key, _) = item.map_err(db_err)?;
                stale.push(key.value());
            }
            for key in &stale {
                log.remove(*key).map_err(db_err)?;
            }
            removed = stale.len();

            let mut meta = write_txn.open_table(LOG_META_TABLE).map_err(db_err)?;
            let last = meta
                .get(META_LAST_INDEX)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            if index > last {
                meta.insert(META_LAST_INDEX, index).map_err(db_err)?;
            }
        }
        write_txn.commit().map_err(db_err)?;

        tracing::debug!(through = index, removed, "Compacted log");
        Ok(())
    }
}
