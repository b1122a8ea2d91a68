//! Randomness for secrets, nonces, and temporary names.
//!
//! Everything here draws from the operating system through `OsRng`.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Fixed-size array of random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// A fresh 32-byte vault secret. Wiped on drop.
pub fn vault_secret() -> Zeroizing<[u8; 32]> {
    let mut secret = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(secret.as_mut());
    secret
}

/// A ChaCha20-Poly1305 nonce. Random nonces are safe for the number of
/// private keys one vault seals.
pub fn vault_nonce() -> [u8; 12] {
    random_bytes()
}

/// Short hex tag for temporary file names.
pub fn temp_suffix() -> String {
    hex::encode(random_bytes::<6>())
}
