//! Private key vault: ChaCha20-Poly1305 under a process-wide secret.
//!
//! The secret is supplied once at startup as 32 bytes of hex and lives
//! only in memory. It is never written next to the ciphertext and never
//! accepted as a per-call argument.
//!
//! Sealed wire form: `nonce (12) || ciphertext || tag (16)`.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Nonce, Tag,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::random::{vault_nonce, vault_secret};
use crate::error::VaultError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Associated data bound into every seal so ciphertexts from other
/// ChaCha20-Poly1305 users of the same secret do not open here.
const VAULT_AAD: &[u8] = b"did-agent/private-key-vault/v1";

/// A sealed private key: nonce, ciphertext and detached tag.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    #[serde(with = "hex_array")]
    pub nonce: [u8; NONCE_LEN],
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_array")]
    pub tag: [u8; TAG_LEN],
}

impl SealedBox {
    /// Encode as `nonce || ciphertext || tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Decode from `nonce || ciphertext || tag`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Malformed(format!(
                "sealed box must be at least {} bytes, got {}",
                NONCE_LEN + TAG_LEN,
                bytes.len()
            )));
        }
        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
        let mut sealed = SealedBox {
            nonce: [0u8; NONCE_LEN],
            ciphertext: ciphertext.to_vec(),
            tag: [0u8; TAG_LEN],
        };
        sealed.nonce.copy_from_slice(nonce);
        sealed.tag.copy_from_slice(tag);
        Ok(sealed)
    }
}

impl std::fmt::Debug for SealedBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedBox")
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Symmetric vault holding the process-wide secret.
pub struct SecretBox {
    key: Zeroizing<[u8; 32]>,
}

impl SecretBox {
    /// Build a vault from a 32-byte secret encoded as 64 hex characters.
    pub fn from_hex(secret_hex: &str) -> Result<Self, VaultError> {
        let bytes = Zeroizing::new(
            hex::decode(secret_hex.trim())
                .map_err(|e| VaultError::InvalidSecret(format!("secret is not hex: {e}")))?,
        );
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            VaultError::InvalidSecret(format!("secret must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_bytes(key))
    }

    /// Build a vault from raw secret bytes.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Mint a fresh random secret, hex encoded, for configuration files.
    pub fn generate_hex() -> String {
        hex::encode(vault_secret().as_slice())
    }

    /// Encrypt `plaintext` with a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBox, VaultError> {
        let cipher = self.cipher()?;
        let nonce = vault_nonce();
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), VAULT_AAD, &mut buffer)
            .map_err(|e| VaultError::EncryptionFailed(format!("encrypt: {e}")))?;
        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(tag.as_slice());
        Ok(SealedBox {
            nonce,
            ciphertext: buffer,
            tag: tag_bytes,
        })
    }

    /// Decrypt a sealed box. Fails unless the tag verifies.
    pub fn open(&self, sealed: &SealedBox) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let cipher = self.cipher()?;
        let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&sealed.nonce),
                VAULT_AAD,
                &mut buffer,
                Tag::from_slice(&sealed.tag),
            )
            .map_err(|_| VaultError::DecryptionFailed)?;
        Ok(buffer)
    }

    /// Decrypt the wire form produced by [`SealedBox::to_bytes`].
    pub fn open_bytes(&self, bytes: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        self.open(&SealedBox::from_bytes(bytes)?)
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, VaultError> {
        ChaCha20Poly1305::new_from_slice(self.key.as_slice())
            .map_err(|e| VaultError::InvalidSecret(format!("cipher init: {e}")))
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {N} bytes")))
    }
}
