//! Key pair generation and import for every supported key type.
//!
//! Ed25519 keys are stored as the raw 32-byte public key.
//! Secp256k1 keys are stored as the 33-byte compressed SEC1 point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::KmsError;

/// Algorithm tag of a managed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Ed25519,
    Secp256k1,
}

impl KeyType {
    /// All key types this crate knows how to generate.
    pub const ALL: [KeyType; 2] = [KeyType::Ed25519, KeyType::Secp256k1];

    /// Return a stable string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::Secp256k1 => "Secp256k1",
        }
    }

    /// Length in bytes of the encoded public key.
    pub fn public_key_len(&self) -> usize {
        match self {
            Self::Ed25519 => 32,
            Self::Secp256k1 => 33,
        }
    }

    /// W3C verification method type used in DID documents.
    pub fn verification_method_type(&self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519VerificationKey2018",
            Self::Secp256k1 => "EcdsaSecp256k1VerificationKey2019",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = KmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "secp256k1" => Ok(Self::Secp256k1),
            other => Err(KmsError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// A private/public key pair of one of the supported types.
///
/// Both inner signing keys zeroize their secret scalar on drop.
pub enum KeyPair {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Ed25519 => {
                Self::Ed25519(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
            }
            KeyType::Secp256k1 => {
                Self::Secp256k1(k256::ecdsa::SigningKey::random(&mut rand::thread_rng()))
            }
        }
    }

    /// Reconstruct a key pair from raw private key bytes.
    pub fn from_private_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self, KmsError> {
        match key_type {
            KeyType::Ed25519 => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| {
                    KmsError::InvalidKeyMaterial(format!(
                        "Ed25519 private key must be 32 bytes, got {}",
                        bytes.len()
                    ))
                })?;
                let raw = Zeroizing::new(raw);
                Ok(Self::Ed25519(ed25519_dalek::SigningKey::from_bytes(&raw)))
            }
            KeyType::Secp256k1 => k256::ecdsa::SigningKey::from_slice(bytes)
                .map(Self::Secp256k1)
                .map_err(|_| {
                    KmsError::InvalidKeyMaterial(format!(
                        "not a valid secp256k1 scalar ({} bytes)",
                        bytes.len()
                    ))
                }),
        }
    }

    /// Return the key type.
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ed25519(_) => KeyType::Ed25519,
            Self::Secp256k1(_) => KeyType::Secp256k1,
        }
    }

    /// Return the encoded public key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(sk) => sk.verifying_key().to_bytes().to_vec(),
            Self::Secp256k1(sk) => sk
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        }
    }

    /// Return the private key bytes, wiped when the returned buffer drops.
    pub fn private_key_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Ed25519(sk) => Zeroizing::new(sk.to_bytes().to_vec()),
            Self::Secp256k1(sk) => Zeroizing::new(sk.to_bytes().to_vec()),
        }
    }

    /// Sign a message. The scheme is fixed by the key type.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(sk) => ed25519_dalek::Signer::sign(sk, message).to_bytes().to_vec(),
            Self::Secp256k1(sk) => {
                let sig: k256::ecdsa::Signature = k256::ecdsa::signature::Signer::sign(sk, message);
                sig.to_bytes().to_vec()
            }
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_type", &self.key_type())
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}
