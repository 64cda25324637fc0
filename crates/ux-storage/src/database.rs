//! RocksDB database implementation.

use crate::{OperationKind, StorageError, StorageResult, Store, WriteBatch};
use rocksdb::{
    ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Columns for organizing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// UTXO set and account records.
    Chainstate,
    /// Blocks and block info, indexed by block hash.
    Blockstate,
    /// Address book snapshots.
    Peerstate,
    /// Transaction hash to containing block hash.
    TxIndex,
}

impl Column {
    /// Get the string name of the column family.
    pub fn name(&self) -> &'static str {
        match self {
            Column::Chainstate => "chainstate",
            Column::Blockstate => "blockstate",
            Column::Peerstate => "peerstate",
            Column::TxIndex => "txindex",
        }
    }

    /// Get all columns.
    pub fn all() -> &'static [Column] {
        &[
            Column::Chainstate,
            Column::Blockstate,
            Column::Peerstate,
            Column::TxIndex,
        ]
    }
}

/// RocksDB database wrapper.
#[derive(Clone)]
pub struct Database {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(1);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Column::all()
            .iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &opts,
            path,
            cf_descriptors,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, column: Column) -> StorageResult<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(column.name())
            .ok_or_else(|| StorageError::UnknownColumn(column.name().to_string()))
    }
}

impl Store for Database {
    fn get(&self, column: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.db.get_cf(&self.cf(column)?, key)?)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> StorageResult<()> {
        Ok(self.db.put_cf(&self.cf(column)?, key, value)?)
    }

    fn delete(&self, column: Column, key: &[u8]) -> StorageResult<()> {
        Ok(self.db.delete_cf(&self.cf(column)?, key)?)
    }

    fn iter_prefix(&self, column: Column, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(column)?;
        let mode = IteratorMode::From(prefix, Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut inner = rocksdb::WriteBatch::default();
        for op in batch.operations {
            let cf = self.cf(op.column)?;
            match op.kind {
                OperationKind::Put { value } => inner.put_cf(&cf, &op.key, &value),
                OperationKind::Delete => inner.delete_cf(&cf, &op.key),
            }
        }
        Ok(self.db.write(inner)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();
        (db, dir)
    }

    #[test]
    fn test_put_get_delete() {
        let (db, _dir) = open_temp();

        db.put(Column::Chainstate, b"key", b"value").unwrap();
        assert_eq!(
            db.get(Column::Chainstate, b"key").unwrap(),
            Some(b"value".to_vec())
        );
        assert!(db.contains(Column::Chainstate, b"key").unwrap());

        // Columns are isolated
        assert_eq!(db.get(Column::Blockstate, b"key").unwrap(), None);

        db.delete(Column::Chainstate, b"key").unwrap();
        assert_eq!(db.get(Column::Chainstate, b"key").unwrap(), None);
    }

    #[test]
    fn test_iter_prefix() {
        let (db, _dir) = open_temp();

        db.put(Column::Chainstate, b"acc:aaa", b"1").unwrap();
        db.put(Column::Chainstate, b"acc:bbb", b"2").unwrap();
        db.put(Column::Chainstate, b"utxo:ccc", b"3").unwrap();

        let accounts = db.iter_prefix(Column::Chainstate, b"acc:").unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|(k, _)| k.starts_with(b"acc:")));
    }

    #[test]
    fn test_write_batch_atomic() {
        let (db, _dir) = open_temp();

        db.put(Column::TxIndex, b"old", b"x").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(Column::TxIndex, b"a".to_vec(), b"1".to_vec());
        batch.put(Column::Blockstate, b"b".to_vec(), b"2".to_vec());
        batch.delete(Column::TxIndex, b"old".to_vec());
        db.write_batch(batch).unwrap();

        assert_eq!(db.get(Column::TxIndex, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.get(Column::Blockstate, b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(db.get(Column::TxIndex, b"old").unwrap(), None);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.put(Column::Peerstate, b"book", b"peers").unwrap();
        }
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(
            db.get(Column::Peerstate, b"book").unwrap(),
            Some(b"peers".to_vec())
        );
    }
}
