//! Error types for the identity agent.
//!
//! Lower layers (stores, vault, KMS backends, method providers, method
//! resolvers) report precise local failures. The managers translate them
//! into [`AgentError`], which every public operation returns.
//! Private key material is never included in error messages.

use std::time::Duration;

/// Coarse classification used by callers to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unknown key, identifier, backend, provider or method. Caller error.
    NotFound,
    /// Name collision, key in use, duplicate link. Not retried.
    Conflict,
    /// Backend or network unavailable, anchoring timeout. Safe to retry
    /// with the same arguments.
    Transient,
    /// Decryption failure, corrupted record, store/provider divergence.
    /// Fatal to the operation and never repaired automatically.
    Integrity,
    /// Malformed input.
    Invalid,
}

/// Agent-level error returned by every public operation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Identifier not found: {0}")]
    IdentifierNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Unknown KMS: {0}")]
    UnknownKms(String),

    #[error("Unknown DID provider: {0}")]
    UnknownProvider(String),

    #[error("No resolver registered for DID method: {0}")]
    UnsupportedMethod(String),

    #[error("No plugin implements method: {0}")]
    MethodNotSupported(String),

    #[error("Key {kid} is referenced by {dids:?}")]
    KeyInUse { kid: String, dids: Vec<String> },

    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Alias already taken: {0}")]
    AliasTaken(String),

    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("Method {method} is claimed by several plugins: {plugins:?}")]
    AmbiguousMethod {
        method: String,
        plugins: Vec<String>,
    },

    #[error("Identifier has been revoked: {0}")]
    IdentifierRevoked(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Anchoring failed for {subject}: {reason}")]
    AnchoringFailed {
        subject: String,
        key_id: Option<String>,
        reason: String,
    },

    #[error("Anchoring timed out for {subject} after {elapsed:?}")]
    AnchoringTimeout {
        subject: String,
        key_id: Option<String>,
        elapsed: Duration,
    },

    #[error("DID provider unavailable for {subject}: {reason}")]
    ProviderUnavailable {
        subject: String,
        key_id: Option<String>,
        reason: String,
    },

    #[error("KMS unavailable: {0}")]
    KmsUnavailable(String),

    #[error("Storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Resolution of {did} failed: {source}")]
    ResolutionFailed {
        did: String,
        #[source]
        source: ResolutionError,
    },

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Corrupted record: {0}")]
    StoreCorrupted(String),

    #[error("Store and provider diverged: {0}")]
    Divergence(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AgentError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::KeyNotFound(_)
            | Self::IdentifierNotFound(_)
            | Self::ServiceNotFound(_)
            | Self::UnknownKms(_)
            | Self::UnknownProvider(_)
            | Self::UnsupportedMethod(_)
            | Self::MethodNotSupported(_) => ErrorClass::NotFound,

            Self::KeyInUse { .. }
            | Self::KeyExists(_)
            | Self::AliasTaken(_)
            | Self::DuplicateRegistration(_)
            | Self::AmbiguousMethod { .. }
            | Self::IdentifierRevoked(_)
            | Self::Conflict(_)
            | Self::AnchoringFailed { .. } => ErrorClass::Conflict,

            Self::AnchoringTimeout { .. }
            | Self::ProviderUnavailable { .. }
            | Self::KmsUnavailable(_)
            | Self::StoreUnavailable(_) => ErrorClass::Transient,

            Self::ResolutionFailed { source, .. } => source.class(),

            Self::DecryptionFailed | Self::StoreCorrupted(_) | Self::Divergence(_) => {
                ErrorClass::Integrity
            }

            Self::UnsupportedKeyType(_)
            | Self::InvalidKeyMaterial(_)
            | Self::InvalidDid(_)
            | Self::InvalidArgument(_)
            | Self::SignatureInvalid
            | Self::Config(_)
            | Self::Serialization(_) => ErrorClass::Invalid,
        }
    }

    /// Return `true` for integrity-class errors.
    pub fn is_integrity(&self) -> bool {
        self.class() == ErrorClass::Integrity
    }

    /// The controller key left behind by a failed `create_identifier`.
    ///
    /// Pass it back as `key_id` to retry without generating another key.
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::AnchoringFailed { key_id, .. }
            | Self::AnchoringTimeout { key_id, .. }
            | Self::ProviderUnavailable { key_id, .. } => key_id.as_deref(),
            _ => None,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, AgentError>;

// ── Layer-local errors ────────────────────────────────────────────────────────

/// Failures reported by a persistence store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Corrupted record {id}: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for AgentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupted { id, reason } => {
                log::error!("corrupted store record {id}: {reason}");
                AgentError::StoreCorrupted(format!("{id}: {reason}"))
            }
            StoreError::Unavailable(msg) => AgentError::StoreUnavailable(msg),
            StoreError::Io(err) => AgentError::StoreUnavailable(err.to_string()),
            StoreError::Serialization(msg) => AgentError::Serialization(msg),
        }
    }
}

/// Failures reported by the private key vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid vault secret: {0}")]
    InvalidSecret(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Malformed sealed box: {0}")]
    Malformed(String),
}

impl From<VaultError> for AgentError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::InvalidSecret(msg) => AgentError::Config(msg),
            VaultError::EncryptionFailed(msg) => AgentError::KmsUnavailable(msg),
            VaultError::DecryptionFailed => {
                log::error!("private key vault rejected a sealed record");
                AgentError::DecryptionFailed
            }
            VaultError::Malformed(reason) => {
                log::error!("private key vault found a malformed sealed record: {reason}");
                AgentError::DecryptionFailed
            }
        }
    }
}

/// Failures reported by a KMS backend.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Private key not found: {0}")]
    KeyNotFound(String),

    #[error("KMS unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<KmsError> for AgentError {
    fn from(e: KmsError) -> Self {
        match e {
            KmsError::UnsupportedKeyType(t) => AgentError::UnsupportedKeyType(t),
            KmsError::InvalidKeyMaterial(msg) => AgentError::InvalidKeyMaterial(msg),
            KmsError::KeyNotFound(kid) => {
                // The key store knows the key but the backend lost its private half.
                log::error!("KMS has no private material for known key {kid}");
                AgentError::Divergence(format!("KMS holds no private key for {kid}"))
            }
            KmsError::Unavailable(msg) => AgentError::KmsUnavailable(msg),
            KmsError::Vault(err) => err.into(),
            KmsError::Store(err) => err.into(),
        }
    }
}

/// Failures reported by a DID method provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The method substrate definitively refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// No confirmation arrived within the configured window. The
    /// operation may still land.
    #[error("no confirmation after {0:?}")]
    Timeout(Duration),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    /// An agent operation the provider depends on (signing) failed.
    #[error(transparent)]
    Agent(Box<AgentError>),
}

impl From<AgentError> for ProviderError {
    fn from(e: AgentError) -> Self {
        ProviderError::Agent(Box::new(e))
    }
}

/// Failures reported by a DID method resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    #[error("unsupported DID method: {0}")]
    UnsupportedMethod(String),

    #[error("not found")]
    NotFound,

    #[error("deactivated")]
    Deactivated,

    #[error("lookup unavailable: {0}")]
    Unavailable(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl ResolutionError {
    /// Classify a resolution failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidDid(_) => ErrorClass::Invalid,
            Self::UnsupportedMethod(_) | Self::NotFound | Self::Deactivated => ErrorClass::NotFound,
            Self::Unavailable(_) => ErrorClass::Transient,
            Self::InvalidDocument(_) => ErrorClass::Integrity,
        }
    }
}
