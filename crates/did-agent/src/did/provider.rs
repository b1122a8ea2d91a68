//! The DID method provider contract.
//!
//! A provider anchors identifiers of one DID method on that method's
//! substrate (a hosted document, a ledger registry, ...). Providers never
//! touch the DID store; the [`DidManager`](crate::did::DidManager) records
//! the outcome after the provider reports success.

use async_trait::async_trait;

use crate::crypto::keys::KeyType;
use crate::did::{Identifier, Service};
use crate::error::ProviderError;
use crate::kms::{Key, KeyManager};

/// What a provider may use from the agent while it works.
#[derive(Clone, Copy)]
pub struct ProviderContext<'a> {
    /// Signs substrate transactions with the identifier's controller key.
    pub keys: &'a KeyManager,
}

/// Result alias for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Anchors and mutates identifiers of one DID method.
///
/// Every call either completes on the substrate or fails with a
/// [`ProviderError`]. `Timeout` means the outcome is unknown, so
/// `create_identifier` must tolerate a retry with the same key.
#[async_trait]
pub trait DidProvider: Send + Sync {
    /// The DID method, e.g. `web` or `ethr`.
    fn method(&self) -> &str;

    /// Key type generated for new identifiers.
    fn default_key_type(&self) -> KeyType;

    /// KMS to use when the caller names none.
    fn default_kms(&self) -> Option<&str> {
        None
    }

    /// Anchor a new identifier controlled by `key`. Returns the DID.
    async fn create_identifier(
        &self,
        ctx: ProviderContext<'_>,
        key: &Key,
        alias: Option<&str>,
    ) -> ProviderResult<String>;

    async fn add_key(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        key: &Key,
    ) -> ProviderResult<()>;

    async fn remove_key(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        kid: &str,
    ) -> ProviderResult<()>;

    async fn add_service(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        service: &Service,
    ) -> ProviderResult<()>;

    async fn remove_service(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        service_id: &str,
    ) -> ProviderResult<()>;

    /// Make the identifier unusable on the substrate.
    async fn deactivate(&self, ctx: ProviderContext<'_>, identifier: &Identifier) -> ProviderResult<()>;
}
