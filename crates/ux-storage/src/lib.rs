//! # ux-storage
//!
//! Persistent state stores for the uxnode blockchain.
//!
//! The node requires four stores, mapped to RocksDB column families:
//! - `Chainstate`: the UTXO set and account records
//! - `Blockstate`: blocks and block info
//! - `Peerstate`: address book snapshots
//! - `TxIndex`: transaction hash to block hash
//!
//! Layout is opaque to callers; only get/put by key and iteration by
//! prefix are assumed. A [`MemoryStore`] double backs unit tests.

mod account;
mod batch;
mod database;
mod error;
mod memory;

pub use account::{account_key, get_account, put_account, utxo_key, Account};
pub use batch::{BatchOperation, OperationKind, WriteBatch};
pub use database::{Column, Database};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

/// Store abstraction over the persistent state.
///
/// This allows for easy testing with in-memory implementations.
pub trait Store: Send + Sync {
    /// Get a value by key from a column.
    fn get(&self, column: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a key-value pair into a column.
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key from a column.
    fn delete(&self, column: Column, key: &[u8]) -> StorageResult<()>;

    /// Check if a key exists in a column.
    fn contains(&self, column: Column, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(column, key)?.is_some())
    }

    /// Collect all key-value pairs whose key starts with the prefix.
    fn iter_prefix(&self, column: Column, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Execute a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;
}
