//! The KMS backend contract.

use async_trait::async_trait;

use crate::crypto::keys::KeyType;
use crate::error::KmsError;
use crate::kms::Key;

/// Public half of a key produced by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub kid: String,
    pub key_type: KeyType,
    pub public_key: Vec<u8>,
}

/// A backend that holds private keys and signs with them.
///
/// Private material never crosses this boundary. `generate` and `import`
/// persist the private half before they return, so a returned key is
/// always usable for `sign`.
#[async_trait]
pub trait KeyManagementSystem: Send + Sync {
    /// Key types this backend can generate, import and sign with.
    fn supported_key_types(&self) -> &[KeyType];

    fn supports(&self, key_type: KeyType) -> bool {
        self.supported_key_types().contains(&key_type)
    }

    async fn generate(&self, key_type: KeyType) -> Result<GeneratedKey, KmsError>;

    async fn import(&self, key_type: KeyType, private_key: &[u8]) -> Result<GeneratedKey, KmsError>;

    /// Sign `data` with the private half of `key`.
    async fn sign(&self, key: &Key, data: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Drop the private half of `kid`. Returns `false` if none was held.
    async fn delete(&self, kid: &str) -> Result<bool, KmsError>;
}
