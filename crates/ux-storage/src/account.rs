//! Account records in the chainstate.

use crate::{Column, StorageError, StorageResult, Store};
use serde::{Deserialize, Serialize};

/// Chainstate key prefix for account records.
const ACCOUNT_PREFIX: &[u8] = b"acc:";

/// Chainstate key prefix for UTXO records.
const UTXO_PREFIX: &[u8] = b"utxo:";

/// The committed state of a sender account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Spendable balance.
    pub balance: u64,
    /// Last committed transaction nonce.
    pub nonce: u64,
}

/// Chainstate key of an account.
pub fn account_key(address: &[u8]) -> Vec<u8> {
    let mut key = ACCOUNT_PREFIX.to_vec();
    key.extend_from_slice(address);
    key
}

/// Chainstate key of a UTXO record.
pub fn utxo_key(tx_hash: &[u8]) -> Vec<u8> {
    let mut key = UTXO_PREFIX.to_vec();
    key.extend_from_slice(tx_hash);
    key
}

/// Load an account from the chainstate. `None` when unknown.
pub fn get_account(store: &dyn Store, address: &[u8]) -> StorageResult<Option<Account>> {
    match store.get(Column::Chainstate, &account_key(address))? {
        Some(bytes) => {
            let account = serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Corrupted(format!("account record: {}", e)))?;
            Ok(Some(account))
        }
        None => Ok(None),
    }
}

/// Persist an account to the chainstate.
pub fn put_account(store: &dyn Store, address: &[u8], account: &Account) -> StorageResult<()> {
    let bytes = serde_json::to_vec(account)
        .map_err(|e| StorageError::Corrupted(format!("account record: {}", e)))?;
    store.put(Column::Chainstate, &account_key(address), &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[test]
    fn test_account_roundtrip() {
        let store = MemoryStore::new();
        let addr = [7u8; 20];

        assert!(get_account(&store, &addr).unwrap().is_none());

        let account = Account {
            balance: 10_000,
            nonce: 3,
        };
        put_account(&store, &addr, &account).unwrap();
        assert_eq!(get_account(&store, &addr).unwrap(), Some(account));
    }

    #[test]
    fn test_key_prefixes_disjoint() {
        let addr = [1u8; 20];
        let hash = [1u8; 32];
        assert!(account_key(&addr).starts_with(b"acc:"));
        assert!(utxo_key(&hash).starts_with(b"utxo:"));
        assert_ne!(account_key(&addr), utxo_key(&addr));
    }

    #[test]
    fn test_corrupted_account_surfaces() {
        let store = MemoryStore::new();
        let addr = [2u8; 20];
        store
            .put(Column::Chainstate, &account_key(&addr), b"not json")
            .unwrap();
        assert!(matches!(
            get_account(&store, &addr),
            Err(StorageError::Corrupted(_))
        ));
    }
}
