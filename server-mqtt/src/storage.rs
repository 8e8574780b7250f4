//! A [`BlobStore`] kept in a redb database file

use std::{fs, path::Path};

use matter_gateway::cache::{BlobStore, StoreError};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use tracing::info;

const BLOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open the database at `path`, creating it and its parent directory if needed
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
        let db = Database::create(path).map_err(StoreError::backend)?;
        info!(path = %path.display(), "opened node cache");
        Ok(Self { db })
    }
}

impl BlobStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = match read_txn.open_table(BLOBS_TABLE) {
            Ok(table) => table,
            // Nothing written yet
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(StoreError::backend(e)),
        };
        let value = table.get(key).map_err(StoreError::backend)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(BLOBS_TABLE)
                .map_err(StoreError::backend)?;
            table.insert(key, value).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let existed = {
            let mut table = write_txn
                .open_table(BLOBS_TABLE)
                .map_err(StoreError::backend)?;
            let removed = table.remove(key).map_err(StoreError::backend)?;
            removed.is_some()
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(existed)
    }
}
