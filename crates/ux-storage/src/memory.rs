//! In-memory store for tests.

use crate::{Column, OperationKind, StorageResult, Store, WriteBatch};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory [`Store`] implementation.
///
/// Keys are held in sorted order so prefix iteration behaves like the
/// on-disk store.
#[derive(Default)]
pub struct MemoryStore {
    columns: RwLock<BTreeMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .columns
            .read()
            .get(column.name())
            .and_then(|m| m.get(key).cloned()))
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.columns
            .write()
            .entry(column.name())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> StorageResult<()> {
        if let Some(m) = self.columns.write().get_mut(column.name()) {
            m.remove(key);
        }
        Ok(())
    }

    fn iter_prefix(&self, column: Column, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .columns
            .read()
            .get(column.name())
            .map(|m| {
                m.range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut columns = self.columns.write();
        for op in batch.operations {
            let m = columns.entry(op.column.name()).or_default();
            match op.kind {
                OperationKind::Put { value } => {
                    m.insert(op.key, value);
                }
                OperationKind::Delete => {
                    m.remove(&op.key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_matches_contract() {
        let store = MemoryStore::new();

        store.put(Column::Chainstate, b"acc:a", b"1").unwrap();
        store.put(Column::Chainstate, b"acc:b", b"2").unwrap();
        store.put(Column::Chainstate, b"zzz", b"3").unwrap();

        assert_eq!(
            store.get(Column::Chainstate, b"acc:a").unwrap(),
            Some(b"1".to_vec())
        );
        assert_eq!(store.iter_prefix(Column::Chainstate, b"acc:").unwrap().len(), 2);

        store.delete(Column::Chainstate, b"acc:a").unwrap();
        assert!(!store.contains(Column::Chainstate, b"acc:a").unwrap());

        let mut batch = WriteBatch::new();
        batch.put(Column::Peerstate, b"book".to_vec(), b"x".to_vec());
        batch.delete(Column::Chainstate, b"acc:b".to_vec());
        store.write_batch(batch).unwrap();

        assert!(store.contains(Column::Peerstate, b"book").unwrap());
        assert!(!store.contains(Column::Chainstate, b"acc:b").unwrap());
    }
}
