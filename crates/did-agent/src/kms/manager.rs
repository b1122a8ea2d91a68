//! The Key Manager: one entry point for key lifecycle across backends.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::keys::KeyType;
use crate::did::IdentifierFilter;
use crate::error::{AgentError, KmsError, Result};
use crate::kms::backend::{GeneratedKey, KeyManagementSystem};
use crate::kms::{Key, KeyFilter, KeyMeta};
use crate::locks::{KeyedGuard, KeyedLocks};
use crate::store::{DidStore, KeyStore};

/// A consistency problem accepted by a forced operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConsistencyWarning {
    /// `did` still names `kid`, which no longer exists.
    #[serde(rename_all = "camelCase")]
    DanglingKeyReference { did: String, kid: String },
}

/// Result of [`KeyManager::delete_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteKeyOutcome {
    pub kid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ConsistencyWarning>,
}

/// Routes key operations to named KMS backends and records public
/// metadata in a [`KeyStore`].
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    backends: HashMap<String, Arc<dyn KeyManagementSystem>>,
    identifiers: Option<Arc<dyn DidStore>>,
    default_kms: Option<String>,
    locks: KeyedLocks,
}

impl KeyManager {
    /// Create a manager with no backends.
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            backends: HashMap::new(),
            identifiers: None,
            default_kms: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Register a backend under `name`, consuming and returning `self`.
    pub fn with_kms(mut self, name: &str, backend: Arc<dyn KeyManagementSystem>) -> Result<Self> {
        self.register_kms(name, backend)?;
        Ok(self)
    }

    /// Register a backend under `name`.
    ///
    /// The first registered backend becomes the default unless one is set.
    pub fn register_kms(&mut self, name: &str, backend: Arc<dyn KeyManagementSystem>) -> Result<()> {
        if self.backends.contains_key(name) {
            return Err(AgentError::DuplicateRegistration(format!("kms {name}")));
        }
        self.backends.insert(name.to_string(), backend);
        if self.default_kms.is_none() {
            self.default_kms = Some(name.to_string());
        }
        Ok(())
    }

    /// Select the backend used when callers name none.
    pub fn with_default_kms(mut self, name: &str) -> Result<Self> {
        if !self.backends.contains_key(name) {
            return Err(AgentError::UnknownKms(name.to_string()));
        }
        self.default_kms = Some(name.to_string());
        Ok(self)
    }

    /// Let `delete_key` see which identifiers reference a key.
    ///
    /// Without it every delete behaves as if no identifier existed.
    pub fn with_identifier_store(mut self, identifiers: Arc<dyn DidStore>) -> Self {
        self.identifiers = Some(identifiers);
        self
    }

    /// Name of the default backend.
    pub fn default_kms(&self) -> Option<&str> {
        self.default_kms.as_deref()
    }

    /// Registered backend names, sorted.
    pub fn kms_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Serialize mutations of one kid.
    pub(crate) async fn lock_key(&self, kid: &str) -> KeyedGuard {
        self.locks.lock(kid).await
    }

    fn backend(&self, kms: &str) -> Result<&Arc<dyn KeyManagementSystem>> {
        self.backends
            .get(kms)
            .ok_or_else(|| AgentError::UnknownKms(kms.to_string()))
    }

    fn checked_backend(&self, kms: &str, key_type: KeyType) -> Result<&Arc<dyn KeyManagementSystem>> {
        let backend = self.backend(kms)?;
        if !backend.supports(key_type) {
            return Err(AgentError::UnsupportedKeyType(format!(
                "{key_type} is not supported by kms {kms}"
            )));
        }
        Ok(backend)
    }

    /// Generate a new key in backend `kms`.
    pub async fn create_key(&self, kms: &str, key_type: KeyType, meta: KeyMeta) -> Result<Key> {
        let backend = self.checked_backend(kms, key_type)?;
        let generated = backend.generate(key_type).await?;
        let key = self.record(kms, generated, meta, false).await?;
        log::info!("created {} key {} in kms {}", key.key_type, key.kid, kms);
        Ok(key)
    }

    /// Import an existing private key into backend `kms`.
    ///
    /// Importing a key already managed by the same backend returns the
    /// stored key unchanged.
    pub async fn import_key(
        &self,
        kms: &str,
        key_type: KeyType,
        private_key: &[u8],
        meta: KeyMeta,
    ) -> Result<Key> {
        let backend = self.checked_backend(kms, key_type)?;
        let generated = backend.import(key_type, private_key).await?;
        let key = self.record(kms, generated, meta, true).await?;
        log::info!("imported {} key {} into kms {}", key.key_type, key.kid, kms);
        Ok(key)
    }

    async fn record(&self, kms: &str, generated: GeneratedKey, meta: KeyMeta, imported: bool) -> Result<Key> {
        let _guard = self.lock_key(&generated.kid).await;

        if let Some(existing) = self.store.get(&generated.kid).await? {
            if existing.kms == kms && imported {
                return Ok(existing);
            }
            if existing.kms != kms {
                // Keep the other backend as the single owner of this kid.
                log::warn!(
                    "key {} is already managed by kms {}, dropping copy in {}",
                    generated.kid,
                    existing.kms,
                    kms
                );
                self.backend(kms)?.delete(&generated.kid).await?;
            }
            return Err(AgentError::KeyExists(generated.kid));
        }

        let key = Key {
            kid: generated.kid,
            kms: kms.to_string(),
            key_type: generated.key_type,
            public_key_hex: hex::encode(&generated.public_key),
            meta,
            created_at: crate::time::now_micros(),
        };
        self.store.put(&key).await?;
        Ok(key)
    }

    /// Look up a key.
    pub async fn get_key(&self, kid: &str) -> Result<Key> {
        log::debug!("get key {kid}");
        self.store
            .get(kid)
            .await?
            .ok_or_else(|| AgentError::KeyNotFound(kid.to_string()))
    }

    /// List keys passing `filter`.
    pub async fn list_keys(&self, filter: &KeyFilter) -> Result<Vec<Key>> {
        Ok(self.store.list(filter).await?)
    }

    /// Sign `data` with key `kid`. The algorithm follows the key type.
    ///
    /// Runs without the kid lock, so a concurrent delete can remove the
    /// private half after the metadata was read. That case is reported as
    /// [`AgentError::KeyNotFound`]; only a key still on record without its
    /// private half is a divergence.
    pub async fn sign(&self, kid: &str, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.get_key(kid).await?;
        let backend = self.backends.get(&key.kms).ok_or_else(|| {
            AgentError::KmsUnavailable(format!("kms {} owning key {kid} is not registered", key.kms))
        })?;
        let signed = backend.sign(&key, data).await;
        if let Err(KmsError::KeyNotFound(_)) = &signed {
            if self.store.get(kid).await?.is_none() {
                log::debug!("key {kid} was deleted while signing");
                return Err(AgentError::KeyNotFound(kid.to_string()));
            }
        }
        Ok(signed?)
    }

    /// Verify `signature` over `data` against key `kid`.
    pub async fn verify(&self, kid: &str, data: &[u8], signature: &[u8]) -> Result<()> {
        self.get_key(kid).await?.verify(data, signature)
    }

    /// Delete key `kid` from its backend and the key store.
    ///
    /// Refuses with [`AgentError::KeyInUse`] while a non-revoked identifier
    /// references the key, unless `force` is set. A forced delete reports
    /// every reference it leaves dangling.
    pub async fn delete_key(&self, kid: &str, force: bool) -> Result<DeleteKeyOutcome> {
        let _guard = self.lock_key(kid).await;
        let key = self.get_key(kid).await?;

        let referencing: Vec<String> = match &self.identifiers {
            Some(identifiers) => identifiers
                .list(&IdentifierFilter::default())
                .await?
                .into_iter()
                .filter(|i| i.is_active() && i.references_key(kid))
                .map(|i| i.did)
                .collect(),
            None => Vec::new(),
        };

        if !referencing.is_empty() && !force {
            return Err(AgentError::KeyInUse {
                kid: kid.to_string(),
                dids: referencing,
            });
        }

        let backend = self.backends.get(&key.kms).ok_or_else(|| {
            AgentError::KmsUnavailable(format!("kms {} owning key {kid} is not registered", key.kms))
        })?;
        if !backend.delete(kid).await? {
            log::warn!("kms {} held no private key for {kid}", key.kms);
        }
        self.store.delete(kid).await?;

        let warnings: Vec<ConsistencyWarning> = referencing
            .into_iter()
            .map(|did| {
                log::warn!("forced delete of key {kid} leaves {did} referencing it");
                ConsistencyWarning::DanglingKeyReference {
                    did,
                    kid: kid.to_string(),
                }
            })
            .collect();

        log::info!("deleted key {kid} from kms {}", key.kms);
        Ok(DeleteKeyOutcome {
            kid: kid.to_string(),
            warnings,
        })
    }
}
