//! Key management: managed key metadata, KMS backends, and the Key Manager.
//!
//! The [`KeyManager`] is the only component allowed to request key
//! generation or signing. It delegates private-key work to a named
//! [`KeyManagementSystem`] backend and writes public metadata to a
//! [`KeyStore`](crate::store::KeyStore).

pub mod backend;
pub mod local;
pub mod manager;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::keys::KeyType;
use crate::crypto::signing;
use crate::error::{AgentError, Result};

pub use backend::{GeneratedKey, KeyManagementSystem};
pub use local::LocalKms;
pub use manager::{ConsistencyWarning, DeleteKeyOutcome, KeyManager};

/// Free-form key metadata.
pub type KeyMeta = BTreeMap<String, serde_json::Value>;

/// Public metadata of a managed key. Never contains private material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    /// Unique across every registered backend.
    pub kid: String,
    /// Logical name of the owning KMS backend.
    pub kms: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub public_key_hex: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: KeyMeta,
    pub created_at: u64,
}

impl Key {
    /// Decode the public key bytes.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.public_key_hex)
            .map_err(|e| AgentError::InvalidKeyMaterial(format!("public key of {}: {e}", self.kid)))
    }

    /// Verify a signature against this key's public material.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        signing::verify(self.key_type, &self.public_key_bytes()?, message, signature)
    }
}

/// Filter for listing keys. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFilter {
    #[serde(default)]
    pub kms: Option<String>,
    #[serde(default, rename = "type")]
    pub key_type: Option<KeyType>,
}

impl KeyFilter {
    /// Return `true` if `key` passes this filter.
    pub fn matches(&self, key: &Key) -> bool {
        self.kms.as_ref().map_or(true, |k| k == &key.kms)
            && self.key_type.map_or(true, |t| t == key.key_type)
    }
}
