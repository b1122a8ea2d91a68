//! Cryptographic primitives for the identity agent.
//!
//! This module provides:
//! - Ed25519 and secp256k1 key pair generation and import
//! - Signing and verification dispatched by key type
//! - The private key vault (ChaCha20-Poly1305 under a process-wide secret)
//! - Cryptographically secure random number generation

pub mod keys;
pub mod random;
pub mod signing;
pub mod vault;

pub use keys::{KeyPair, KeyType};
pub use vault::{SealedBox, SecretBox};
