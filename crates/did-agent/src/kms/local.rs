//! Local KMS: software keys sealed by the private key vault.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::keys::{KeyPair, KeyType};
use crate::crypto::vault::SecretBox;
use crate::error::{KmsError, StoreError};
use crate::kms::backend::{GeneratedKey, KeyManagementSystem};
use crate::kms::Key;
use crate::store::{PrivateKeyRecord, PrivateKeyStore};

/// Software KMS storing sealed private keys in a [`PrivateKeyStore`].
///
/// The kid is the hex-encoded public key, so importing the same private
/// key twice yields the same kid.
pub struct LocalKms {
    store: Arc<dyn PrivateKeyStore>,
    vault: Arc<SecretBox>,
}

impl LocalKms {
    pub fn new(store: Arc<dyn PrivateKeyStore>, vault: Arc<SecretBox>) -> Self {
        Self { store, vault }
    }

    async fn persist(&self, pair: &KeyPair) -> Result<GeneratedKey, KmsError> {
        let public_key = pair.public_key_bytes();
        let kid = hex::encode(&public_key);
        let sealed = self.vault.seal(&pair.private_key_bytes())?;
        self.store
            .put(&PrivateKeyRecord {
                kid: kid.clone(),
                key_type: pair.key_type(),
                sealed,
            })
            .await?;
        Ok(GeneratedKey {
            kid,
            key_type: pair.key_type(),
            public_key,
        })
    }

    /// Open the sealed record of `key` and check it still matches.
    async fn load(&self, key: &Key) -> Result<KeyPair, KmsError> {
        let record = self
            .store
            .get(&key.kid)
            .await?
            .ok_or_else(|| KmsError::KeyNotFound(key.kid.clone()))?;

        let corrupted = |reason: String| {
            KmsError::Store(StoreError::Corrupted {
                id: key.kid.clone(),
                reason,
            })
        };

        if record.key_type != key.key_type {
            return Err(corrupted(format!(
                "sealed key is {}, metadata says {}",
                record.key_type, key.key_type
            )));
        }

        let private_key = self.vault.open(&record.sealed)?;
        let pair = KeyPair::from_private_bytes(record.key_type, &private_key)
            .map_err(|_| corrupted("sealed key is not valid key material".into()))?;
        if hex::encode(pair.public_key_bytes()) != key.public_key_hex {
            return Err(corrupted("sealed key does not match public key".into()));
        }
        Ok(pair)
    }
}

#[async_trait]
impl KeyManagementSystem for LocalKms {
    fn supported_key_types(&self) -> &[KeyType] {
        &KeyType::ALL
    }

    async fn generate(&self, key_type: KeyType) -> Result<GeneratedKey, KmsError> {
        self.persist(&KeyPair::generate(key_type)).await
    }

    async fn import(&self, key_type: KeyType, private_key: &[u8]) -> Result<GeneratedKey, KmsError> {
        let pair = KeyPair::from_private_bytes(key_type, private_key)?;
        self.persist(&pair).await
    }

    async fn sign(&self, key: &Key, data: &[u8]) -> Result<Vec<u8>, KmsError> {
        let pair = self.load(key).await?;
        Ok(pair.sign(data))
    }

    async fn delete(&self, kid: &str) -> Result<bool, KmsError> {
        Ok(self.store.delete(kid).await?)
    }
}
