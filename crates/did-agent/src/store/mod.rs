//! Persistence contracts for keys, sealed private keys, and identifiers.
//!
//! Each store exposes a narrow `get` / `put` / `delete` / `list` contract.
//! Every single call is atomic; nothing here spans two stores.
//!
//! # Implementations
//!
//! - [`memory`]: `RwLock`-guarded maps, for tests and ephemeral agents.
//! - [`file`]: one JSON file per record, written atomically:
//!
//! ```text
//! {storage_dir}/
//! ├── keys/          Key metadata
//! │   └── {hex(kid)}.json
//! ├── private-keys/  sealed private keys
//! │   └── {hex(kid)}.json
//! └── identifiers/   identity records
//!     └── {hex(did)}.json
//! ```

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::keys::KeyType;
use crate::crypto::vault::SealedBox;
use crate::did::{Identifier, IdentifierFilter};
use crate::error::StoreError;
use crate::kms::{Key, KeyFilter};

pub use file::{FileDidStore, FileKeyStore, FilePrivateKeyStore};
pub use memory::{MemoryDidStore, MemoryKeyStore, MemoryPrivateKeyStore};

/// Store result alias.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Sealed private key of one managed key.
///
/// Only the KMS backend that wrote it can open it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKeyRecord {
    pub kid: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub sealed: SealedBox,
}

impl std::fmt::Debug for PrivateKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyRecord")
            .field("kid", &self.kid)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

/// Public key metadata, keyed by kid.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, kid: &str) -> StoreResult<Option<Key>>;
    async fn put(&self, key: &Key) -> StoreResult<()>;
    /// Returns `true` if a record was removed.
    async fn delete(&self, kid: &str) -> StoreResult<bool>;
    async fn list(&self, filter: &KeyFilter) -> StoreResult<Vec<Key>>;
}

/// Sealed private keys, keyed by kid.
#[async_trait]
pub trait PrivateKeyStore: Send + Sync {
    async fn get(&self, kid: &str) -> StoreResult<Option<PrivateKeyRecord>>;
    async fn put(&self, record: &PrivateKeyRecord) -> StoreResult<()>;
    async fn delete(&self, kid: &str) -> StoreResult<bool>;
    async fn list(&self) -> StoreResult<Vec<String>>;
}

/// Identity records, keyed by DID.
#[async_trait]
pub trait DidStore: Send + Sync {
    async fn get(&self, did: &str) -> StoreResult<Option<Identifier>>;
    async fn put(&self, identifier: &Identifier) -> StoreResult<()>;
    async fn delete(&self, did: &str) -> StoreResult<bool>;
    async fn list(&self, filter: &IdentifierFilter) -> StoreResult<Vec<Identifier>>;
}
