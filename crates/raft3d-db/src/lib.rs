//! raft3d DB - redb implementation of the log and snapshot storage traits.

pub mod log_store;
pub mod snapshot_store;
pub mod tables;

pub use log_store::RedbLogStore;
pub use snapshot_store::{RedbSnapshotSink, RedbSnapshotStore};

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use raft3d_core::StorageError;

use crate::tables::db_err;

/// Initialize a database with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StorageError> {
    let db = Database::create(path).map_err(db_err)?;

    RedbLogStore::init_tables(&db)?;
    RedbSnapshotStore::init_tables(&db)?;

    Ok(Arc::new(db))
}
