//! Signature verification against stored public key material.
//!
//! Signing itself happens inside a KMS backend via [`KeyPair::sign`];
//! verification only needs the public key and is available to anyone.
//!
//! [`KeyPair::sign`]: crate::crypto::keys::KeyPair::sign

use crate::crypto::keys::KeyType;
use crate::error::{AgentError, Result};

/// Verify a signature produced by a key of `key_type`.
pub fn verify(key_type: KeyType, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    match key_type {
        KeyType::Ed25519 => {
            let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
                AgentError::InvalidKeyMaterial("Ed25519 public key must be 32 bytes".into())
            })?;
            let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
                .map_err(|e| AgentError::InvalidKeyMaterial(format!("invalid Ed25519 key: {e}")))?;
            let sig_bytes: [u8; 64] = signature
                .try_into()
                .map_err(|_| AgentError::SignatureInvalid)?;
            let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
            ed25519_dalek::Verifier::verify(&verifying_key, message, &sig)
                .map_err(|_| AgentError::SignatureInvalid)
        }
        KeyType::Secp256k1 => {
            let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|e| AgentError::InvalidKeyMaterial(format!("invalid secp256k1 key: {e}")))?;
            let sig = k256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| AgentError::SignatureInvalid)?;
            k256::ecdsa::signature::Verifier::verify(&verifying_key, message, &sig)
                .map_err(|_| AgentError::SignatureInvalid)
        }
    }
}

/// Verify a signature given hex-encoded public key and signature.
pub fn verify_hex(
    key_type: KeyType,
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<()> {
    let public_key = hex::decode(public_key_hex)
        .map_err(|e| AgentError::InvalidKeyMaterial(format!("invalid public key hex: {e}")))?;
    let signature = hex::decode(signature_hex).map_err(|_| AgentError::SignatureInvalid)?;
    verify(key_type, &public_key, message, &signature)
}
