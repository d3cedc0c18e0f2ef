use std::io::Write;
use std::sync::Arc;

use redb::{Database, ReadableTable};

use raft3d_core::{SnapshotMeta, SnapshotSink, SnapshotStore, StorageError};

use crate::tables::{db_err, SNAPSHOT_DATA, SNAPSHOT_META, SNAPSHOT_TABLE};

/// redb implementation of SnapshotStore. Keeps only the latest snapshot.
pub struct RedbSnapshotStore {
    db: Arc<Database>,
}

impl RedbSnapshotStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            let _ = write_txn.open_table(SNAPSHOT_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

/// Buffers a snapshot in memory and stores it in one write transaction on
/// close, so a crash mid-write never leaves a partial snapshot behind.
pub struct RedbSnapshotSink {
    db: Arc<Database>,
    meta: SnapshotMeta,
    buffer: Vec<u8>,
    canceled: bool,
}

impl Write for RedbSnapshotSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SnapshotSink for RedbSnapshotSink {
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

        let meta = serde_json::to_vec(&self.meta).map_err(db_err)?;
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(SNAPSHOT_TABLE).map_err(db_err)?;
            table
                .insert(SNAPSHOT_META, meta.as_slice())
                .map_err(db_err)?;
            table
                .insert(SNAPSHOT_DATA, self.buffer.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        tracing::info!(
            last_index = self.meta.last_index,
            bytes = self.buffer.len(),
            "Stored snapshot"
        );
        self.buffer = Vec::new();
        Ok(())
    }
}

impl SnapshotStore for RedbSnapshotStore {
    type Sink = RedbSnapshotSink;

    fn create(&self, meta: SnapshotMeta) -> Result<Self::Sink, StorageError> {
        Ok(RedbSnapshotSink {
            db: self.db.clone(),
            meta,
            buffer: Vec::new(),
            canceled: false,
        })
    }

    fn latest(&self) -> Result<Option<(SnapshotMeta, Vec<u8>)>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(SNAPSHOT_TABLE).map_err(db_err)?;

        let meta = match table.get(SNAPSHOT_META).map_err(db_err)? {
            Some(value) => {
                let meta: SnapshotMeta = serde_json::from_slice(value.value()).map_err(db_err)?;
                meta
            }
            None => return Ok(None),
        };
        let data = table
            .get(SNAPSHOT_DATA)
            .map_err(db_err)?
            .map(|v| v.value().to_vec())
            .unwrap_or_default();

        Ok(Some((meta, data)))
    }
}
