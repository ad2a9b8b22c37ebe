//! Quick-unlock keystores.
//!
//! A quick-unlock store maps a database UUID to an encrypted, serialized
//! composite key so that a database can be re-opened without re-entering all
//! key factors. The engine only consumes this interface; hosts provide an
//! OS-backed implementation, and everything must keep working when no store
//! is available.

use std::collections::HashMap;

use secstr::SecStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors interacting with a quick-unlock store
#[derive(Debug, Error)]
pub enum QuickUnlockError {
    /// The backing store rejected the operation or is unavailable
    #[error("Quick-unlock store failure: {0}")]
    Store(String),
}

/// An optional store for serialized database keys, keyed by database UUID.
pub trait QuickUnlockStore {
    /// Whether the store can currently be used at all
    fn is_available(&self) -> bool;

    /// Remember the key blob for a database
    fn put(&mut self, database: &Uuid, key_blob: &[u8]) -> Result<(), QuickUnlockError>;

    /// Recall the key blob for a database, if one was stored
    fn get(&self, database: &Uuid) -> Result<Option<SecStr>, QuickUnlockError>;

    /// Whether a key blob is stored for a database
    fn has(&self, database: &Uuid) -> bool;

    /// Forget the key blob for a database
    fn clear(&mut self, database: &Uuid) -> Result<(), QuickUnlockError>;

    /// Forget all stored key blobs
    fn clear_all(&mut self) -> Result<(), QuickUnlockError>;
}

/// A process-local store without OS backing.
///
/// Key blobs are held in protected memory and forgotten when the store is
/// dropped.
#[derive(Default)]
pub struct MemoryQuickUnlock {
    entries: HashMap<Uuid, SecStr>,
}

impl MemoryQuickUnlock {
    pub fn new() -> Self {
        Default::default()
    }
}

impl QuickUnlockStore for MemoryQuickUnlock {
    fn is_available(&self) -> bool {
        true
    }

    fn put(&mut self, database: &Uuid, key_blob: &[u8]) -> Result<(), QuickUnlockError> {
        self.entries.insert(*database, SecStr::new(key_blob.to_vec()));
        Ok(())
    }

    fn get(&self, database: &Uuid) -> Result<Option<SecStr>, QuickUnlockError> {
        Ok(self.entries.get(database).cloned())
    }

    fn has(&self, database: &Uuid) -> bool {
        self.entries.contains_key(database)
    }

    fn clear(&mut self, database: &Uuid) -> Result<(), QuickUnlockError> {
        self.entries.remove(database);
        Ok(())
    }

    fn clear_all(&mut self) -> Result<(), QuickUnlockError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod keystore_tests {
    use super::*;
    use crate::key::DatabaseKey;

    #[test]
    fn store_and_recall_a_key() -> Result<(), Box<dyn std::error::Error>> {
        let mut store = MemoryQuickUnlock::new();
        assert!(store.is_available());

        let database = Uuid::new_v4();
        let key = DatabaseKey::new().with_password("quick unlock me");

        assert!(!store.has(&database));
        store.put(&database, &key.serialize())?;
        assert!(store.has(&database));

        let blob = store.get(&database)?.expect("blob was stored");
        let recalled = DatabaseKey::deserialize(blob.unsecure())?;
        assert_eq!(recalled, key);

        store.clear(&database)?;
        assert!(!store.has(&database));
        assert!(store.get(&database)?.is_none());

        Ok(())
    }

    #[test]
    fn clear_all_forgets_every_database() -> Result<(), QuickUnlockError> {
        let mut store = MemoryQuickUnlock::new();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.put(&a, b"blob-a")?;
        store.put(&b, b"blob-b")?;

        store.clear_all()?;
        assert!(!store.has(&a));
        assert!(!store.has(&b));
        Ok(())
    }
}
