//! `did:ethr`: identifiers anchored in a ledger registry.
//!
//! `did:ethr:<network>:0x<address>` where the address is derived from the
//! secp256k1 controller key. Every change is a registry transaction signed
//! by the controller key through the Key Manager and confirmed by polling
//! the ledger for its receipt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::crypto::keys::KeyType;
use crate::did::provider::{DidProvider, ProviderContext, ProviderResult};
use crate::did::{DidDocument, DocumentMetadata, Identifier, ParsedDid, Service, VerificationMethod};
use crate::error::{AgentError, ProviderError, ResolutionError};
use crate::kms::Key;
use crate::methods::ledger::{
    address_from_public_key, is_address, Delegate, Ledger, LedgerError, RegistryOp, RegistryState,
    RegistryTransaction, SignedTransaction, TxStatus,
};
use crate::resolver::MethodResolver;

const METHOD: &str = "ethr";
const RECOVERY_METHOD_TYPE: &str = "EcdsaSecp256k1RecoveryMethod2020";

/// Network used when a DID carries no network segment.
pub const DEFAULT_NETWORK: &str = "mainnet";

const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A named network and the ledger serving it.
#[derive(Clone)]
pub struct EthrNetwork {
    pub name: String,
    pub ledger: Arc<dyn Ledger>,
}

impl EthrNetwork {
    pub fn new(name: impl Into<String>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            name: name.into(),
            ledger,
        }
    }
}

impl From<LedgerError> for ProviderError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Unavailable(msg) => ProviderError::Unavailable(msg),
            LedgerError::Rejected(msg) => ProviderError::Rejected(msg),
        }
    }
}

impl From<LedgerError> for ResolutionError {
    fn from(e: LedgerError) -> Self {
        ResolutionError::Unavailable(e.to_string())
    }
}

/// Split `network:0xaddress` (or a bare address) into its parts.
fn split_method_id(did: &ParsedDid) -> Result<(&str, &str), ResolutionError> {
    let (network, address) = match did.method_id.rsplit_once(':') {
        Some((network, address)) => (network, address),
        None => (DEFAULT_NETWORK, did.method_id.as_str()),
    };
    if !is_address(address) {
        return Err(ResolutionError::InvalidDid(did.did.clone()));
    }
    Ok((network, address))
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Anchors `did:ethr` identifiers on one network.
pub struct EthrDidProvider {
    network: EthrNetwork,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    default_kms: Option<String>,
    /// Registrations submitted but not yet confirmed, by address.
    in_flight: Mutex<HashMap<String, String>>,
}

impl EthrDidProvider {
    pub fn new(network: EthrNetwork) -> Self {
        Self {
            network,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_kms: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Bound how long a transaction may stay unconfirmed.
    pub fn with_confirmation(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_default_kms(mut self, kms: impl Into<String>) -> Self {
        self.default_kms = Some(kms.into());
        self
    }

    /// The DID a controller key maps to on this network.
    pub fn did_for(&self, key: &Key) -> ProviderResult<(String, String)> {
        if key.key_type != KeyType::Secp256k1 {
            return Err(ProviderError::UnsupportedKey(format!(
                "did:ethr needs a secp256k1 controller, got {}",
                key.key_type
            )));
        }
        let address = address_from_public_key(&key.public_key_bytes()?)?;
        Ok((format!("did:{METHOD}:{}:{address}", self.network.name), address))
    }

    fn address_of(did: &str) -> ProviderResult<String> {
        let parsed = ParsedDid::parse(did).map_err(|e| ProviderError::Rejected(e.to_string()))?;
        let (_, address) =
            split_method_id(&parsed).map_err(|e| ProviderError::Rejected(e.to_string()))?;
        Ok(address.to_string())
    }

    fn in_flight(&self, address: &str) -> Option<String> {
        self.in_flight.lock().ok()?.get(address).cloned()
    }

    fn set_in_flight(&self, address: &str, tx_hash: Option<String>) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            match tx_hash {
                Some(hash) => in_flight.insert(address.to_string(), hash),
                None => in_flight.remove(address),
            };
        }
    }

    /// Sign `op` with `controller_kid` and submit it. Returns the tx hash.
    async fn submit(
        &self,
        ctx: ProviderContext<'_>,
        address: &str,
        controller_kid: &str,
        op: RegistryOp,
    ) -> ProviderResult<String> {
        let ledger = &self.network.ledger;
        let nonce = ledger
            .registry_state(address)
            .await?
            .map_or(0, |state| state.nonce);
        let op_name = op.name();
        let tx = RegistryTransaction {
            identity: address.to_string(),
            nonce,
            op,
        };
        let message = tx.signing_bytes(ledger.chain_id())?;
        let signature = ctx.keys.sign(controller_kid, &message).await?;
        let signer = ctx.keys.get_key(controller_kid).await?;

        let tx_hash = ledger
            .submit(SignedTransaction {
                tx,
                signer_public_key_hex: signer.public_key_hex,
                signature_hex: hex::encode(signature),
            })
            .await?;
        log::debug!("submitted {op_name} for {address} as {tx_hash}");
        Ok(tx_hash)
    }

    /// Poll until `tx_hash` is mined or the confirmation window closes.
    async fn confirm(&self, tx_hash: &str) -> ProviderResult<u64> {
        let ledger = &self.network.ledger;
        let poll = async {
            loop {
                match ledger.receipt(tx_hash).await {
                    Ok(Some(receipt)) => match receipt.status {
                        TxStatus::Confirmed { block } => return Ok(block),
                        TxStatus::Reverted { reason } => return Err(ProviderError::Rejected(reason)),
                        TxStatus::Pending => {}
                    },
                    Ok(None) => {}
                    Err(e) => log::debug!("receipt poll for {tx_hash} failed: {e}"),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(self.confirmation_timeout, poll)
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.confirmation_timeout)))
    }

    async fn transact(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        op: RegistryOp,
    ) -> ProviderResult<()> {
        let address = Self::address_of(&identifier.did)?;
        let tx_hash = self
            .submit(ctx, &address, &identifier.controller_key_id, op)
            .await?;
        let block = self.confirm(&tx_hash).await?;
        log::debug!("{tx_hash} confirmed in block {block}");
        Ok(())
    }

    /// `Ok(true)` if the registry already shows `address` owned by itself.
    fn registered_to_self(address: &str, state: &Option<RegistryState>) -> ProviderResult<bool> {
        match state {
            None => Ok(false),
            Some(state) if state.deactivated => {
                Err(ProviderError::Rejected(format!("{address} is deactivated")))
            }
            Some(state) if state.owner == address => Ok(true),
            Some(state) => Err(ProviderError::Rejected(format!(
                "{address} is owned by {}",
                state.owner
            ))),
        }
    }
}

#[async_trait]
impl DidProvider for EthrDidProvider {
    fn method(&self) -> &str {
        METHOD
    }

    fn default_key_type(&self) -> KeyType {
        KeyType::Secp256k1
    }

    fn default_kms(&self) -> Option<&str> {
        self.default_kms.as_deref()
    }

    async fn create_identifier(
        &self,
        ctx: ProviderContext<'_>,
        key: &Key,
        _alias: Option<&str>,
    ) -> ProviderResult<String> {
        let (did, address) = self.did_for(key)?;
        let ledger = &self.network.ledger;

        if Self::registered_to_self(&address, &ledger.registry_state(&address).await?)? {
            log::debug!("{did} is already registered");
            self.set_in_flight(&address, None);
            return Ok(did);
        }

        let tx_hash = match self.in_flight(&address) {
            Some(hash) => {
                log::debug!("resuming confirmation of {hash} for {did}");
                hash
            }
            None => {
                let hash = self
                    .submit(
                        ctx,
                        &address,
                        &key.kid,
                        RegistryOp::Register {
                            owner: address.clone(),
                            public_key_hex: key.public_key_hex.clone(),
                        },
                    )
                    .await?;
                self.set_in_flight(&address, Some(hash.clone()));
                hash
            }
        };

        match self.confirm(&tx_hash).await {
            Ok(_) => {
                self.set_in_flight(&address, None);
                Ok(did)
            }
            Err(ProviderError::Rejected(reason)) => {
                self.set_in_flight(&address, None);
                // A concurrent or earlier registration may have landed first.
                if Self::registered_to_self(&address, &ledger.registry_state(&address).await?)? {
                    return Ok(did);
                }
                Err(ProviderError::Rejected(reason))
            }
            Err(e) => Err(e),
        }
    }

    async fn add_key(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        key: &Key,
    ) -> ProviderResult<()> {
        let delegate = Delegate {
            key_type: key.key_type,
            public_key_hex: key.public_key_hex.clone(),
        };
        self.transact(ctx, identifier, RegistryOp::AddDelegate { delegate })
            .await
    }

    async fn remove_key(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        kid: &str,
    ) -> ProviderResult<()> {
        let public_key_hex = match ctx.keys.get_key(kid).await {
            Ok(key) => key.public_key_hex,
            // Local kids are the public key itself; a force-deleted key can
            // still be revoked by it.
            Err(AgentError::KeyNotFound(_)) => kid.to_string(),
            Err(e) => return Err(e.into()),
        };
        self.transact(ctx, identifier, RegistryOp::RevokeDelegate { public_key_hex })
            .await
    }

    async fn add_service(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        service: &Service,
    ) -> ProviderResult<()> {
        self.transact(
            ctx,
            identifier,
            RegistryOp::SetService {
                service: service.clone(),
            },
        )
        .await
    }

    async fn remove_service(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        service_id: &str,
    ) -> ProviderResult<()> {
        self.transact(
            ctx,
            identifier,
            RegistryOp::RevokeService {
                id: service_id.to_string(),
            },
        )
        .await
    }

    async fn deactivate(&self, ctx: ProviderContext<'_>, identifier: &Identifier) -> ProviderResult<()> {
        self.transact(ctx, identifier, RegistryOp::Deactivate).await
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Resolves `did:ethr` from per-network registry state.
#[derive(Default)]
pub struct EthrDidResolver {
    networks: HashMap<String, Arc<dyn Ledger>>,
}

impl EthrDidResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: EthrNetwork) -> Self {
        self.networks.insert(network.name, network.ledger);
        self
    }

    fn document(did: &str, address: &str, chain_id: u64, state: Option<&RegistryState>) -> DidDocument {
        let owner = state.map_or(address, |s| s.owner.as_str());
        let controller = VerificationMethod {
            id: format!("{did}#controller"),
            type_: RECOVERY_METHOD_TYPE.to_string(),
            controller: did.to_string(),
            public_key_hex: None,
            blockchain_account_id: Some(format!("eip155:{chain_id}:{owner}")),
        };
        let mut document = DidDocument::new(did).with_authenticating_method(controller);

        let Some(state) = state else {
            return document;
        };

        if let Some(public_key_hex) = &state.owner_public_key_hex {
            document = document.with_authenticating_method(VerificationMethod::from_public_key(
                format!("{did}#controllerKey"),
                did,
                KeyType::Secp256k1,
                public_key_hex.clone(),
            ));
        }
        for (i, delegate) in state.delegates.iter().enumerate() {
            document = document.with_assertion_method(VerificationMethod::from_public_key(
                format!("{did}#delegate-{}", i + 1),
                did,
                delegate.key_type,
                delegate.public_key_hex.clone(),
            ));
        }
        for service in &state.services {
            document = document.with_service(service.clone());
        }
        document.metadata = DocumentMetadata {
            deactivated: false,
            version_id: Some(state.version.to_string()),
            updated: None,
        };
        document
    }
}

#[async_trait]
impl MethodResolver for EthrDidResolver {
    fn method(&self) -> &str {
        METHOD
    }

    async fn resolve(&self, did: &ParsedDid) -> Result<DidDocument, ResolutionError> {
        let (network, address) = split_method_id(did)?;
        let ledger = self
            .networks
            .get(network)
            .ok_or_else(|| ResolutionError::UnsupportedMethod(format!("ethr network {network}")))?;

        let state = ledger.registry_state(address).await?;
        if state.as_ref().map_or(false, |s| s.deactivated) {
            return Err(ResolutionError::Deactivated);
        }
        Ok(Self::document(&did.did, address, ledger.chain_id(), state.as_ref()))
    }
}
