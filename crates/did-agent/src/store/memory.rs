//! In-memory stores.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{DidStore, KeyStore, PrivateKeyRecord, PrivateKeyStore, StoreResult};
use crate::did::{Identifier, IdentifierFilter};
use crate::error::StoreError;
use crate::kms::{Key, KeyFilter};

/// A map of records guarded by a `RwLock`. Listing order is by id.
pub struct MemoryStore<T> {
    records: RwLock<BTreeMap<String, T>>,
}

/// In-memory [`KeyStore`].
pub type MemoryKeyStore = MemoryStore<Key>;
/// In-memory [`PrivateKeyStore`].
pub type MemoryPrivateKeyStore = MemoryStore<PrivateKeyRecord>;
/// In-memory [`DidStore`].
pub type MemoryDidStore = MemoryStore<Identifier>;

impl<T: Clone> MemoryStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Return `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, T>>> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, T>>> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn get_record(&self, id: &str) -> StoreResult<Option<T>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn put_record(&self, id: &str, record: &T) -> StoreResult<()> {
        self.write()?.insert(id.to_string(), record.clone());
        Ok(())
    }

    fn delete_record(&self, id: &str) -> StoreResult<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    fn list_records(&self, pred: impl Fn(&T) -> bool) -> StoreResult<Vec<T>> {
        Ok(self.read()?.values().filter(|r| pred(r)).cloned().collect())
    }
}

impl<T: Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for MemoryStore<Key> {
    async fn get(&self, kid: &str) -> StoreResult<Option<Key>> {
        self.get_record(kid)
    }

    async fn put(&self, key: &Key) -> StoreResult<()> {
        self.put_record(&key.kid, key)
    }

    async fn delete(&self, kid: &str) -> StoreResult<bool> {
        self.delete_record(kid)
    }

    async fn list(&self, filter: &KeyFilter) -> StoreResult<Vec<Key>> {
        self.list_records(|k| filter.matches(k))
    }
}

#[async_trait]
impl PrivateKeyStore for MemoryStore<PrivateKeyRecord> {
    async fn get(&self, kid: &str) -> StoreResult<Option<PrivateKeyRecord>> {
        self.get_record(kid)
    }

    async fn put(&self, record: &PrivateKeyRecord) -> StoreResult<()> {
        self.put_record(&record.kid, record)
    }

    async fn delete(&self, kid: &str) -> StoreResult<bool> {
        self.delete_record(kid)
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }
}

#[async_trait]
impl DidStore for MemoryStore<Identifier> {
    async fn get(&self, did: &str) -> StoreResult<Option<Identifier>> {
        self.get_record(did)
    }

    async fn put(&self, identifier: &Identifier) -> StoreResult<()> {
        self.put_record(&identifier.did, identifier)
    }

    async fn delete(&self, did: &str) -> StoreResult<bool> {
        self.delete_record(did)
    }

    async fn list(&self, filter: &IdentifierFilter) -> StoreResult<Vec<Identifier>> {
        self.list_records(|i| filter.matches(i))
    }
}
