//! The DID Manager: identifier lifecycle across method providers.
//!
//! Every mutation runs in the same order: validate against the stored
//! record, apply on the method substrate through the provider, then write
//! the new record. A provider failure leaves the store untouched. A store
//! failure after provider success is reported as
//! [`AgentError::Divergence`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::did::provider::{DidProvider, ProviderContext, ProviderResult};
use crate::did::{Identifier, IdentifierChange, IdentifierFilter, IdentifierState};
use crate::error::{AgentError, ProviderError, Result};
use crate::kms::{Key, KeyManager, KeyMeta};
use crate::locks::KeyedLocks;
use crate::store::DidStore;

/// Arguments of [`DidManager::create_identifier`].
#[derive(Debug, Clone, Default)]
pub struct CreateIdentifierOptions {
    /// Registered provider name. Defaults to the manager's default.
    pub provider: Option<String>,
    /// KMS for a newly generated key. Defaults to the provider's, then
    /// the Key Manager's default.
    pub kms: Option<String>,
    pub alias: Option<String>,
    /// Reuse an existing key, typically the one reported by a failed
    /// attempt.
    pub key_id: Option<String>,
    /// Upper bound on the provider call.
    pub anchor_timeout: Option<Duration>,
}

impl CreateIdentifierOptions {
    pub fn with_alias(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..Default::default()
        }
    }
}

/// Manages identifiers and their anchoring.
pub struct DidManager {
    store: Arc<dyn DidStore>,
    keys: Arc<KeyManager>,
    providers: HashMap<String, Arc<dyn DidProvider>>,
    default_provider: Option<String>,
    locks: KeyedLocks,
}

impl DidManager {
    pub fn new(store: Arc<dyn DidStore>, keys: Arc<KeyManager>) -> Self {
        Self {
            store,
            keys,
            providers: HashMap::new(),
            default_provider: None,
            locks: KeyedLocks::new(),
        }
    }

    /// Register a provider under `name`, consuming and returning `self`.
    pub fn with_provider(mut self, name: &str, provider: Arc<dyn DidProvider>) -> Result<Self> {
        self.register_provider(name, provider)?;
        Ok(self)
    }

    /// Register a provider under `name`. The first one becomes the default.
    pub fn register_provider(&mut self, name: &str, provider: Arc<dyn DidProvider>) -> Result<()> {
        if self.providers.contains_key(name) {
            return Err(AgentError::DuplicateRegistration(format!("provider {name}")));
        }
        self.providers.insert(name.to_string(), provider);
        if self.default_provider.is_none() {
            self.default_provider = Some(name.to_string());
        }
        Ok(())
    }

    pub fn with_default_provider(mut self, name: &str) -> Result<Self> {
        if !self.providers.contains_key(name) {
            return Err(AgentError::UnknownProvider(name.to_string()));
        }
        self.default_provider = Some(name.to_string());
        Ok(self)
    }

    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// The Key Manager this DID Manager draws keys from.
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn DidProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| AgentError::UnknownProvider(name.to_string()))
    }

    fn context(&self) -> ProviderContext<'_> {
        ProviderContext { keys: &self.keys }
    }

    // ── Creation ──────────────────────────────────────────────────────────────

    /// Create and anchor a new identifier.
    ///
    /// The controller key is created before anchoring starts and is kept
    /// when anchoring fails; the error carries its kid so the caller can
    /// retry with `key_id` set.
    pub async fn create_identifier(&self, options: CreateIdentifierOptions) -> Result<Identifier> {
        let provider_name = match options.provider.as_deref().or(self.default_provider()) {
            Some(name) => name.to_string(),
            None => {
                return Err(AgentError::InvalidArgument(
                    "no provider given and no default provider registered".into(),
                ))
            }
        };
        let provider = self.provider(&provider_name)?.clone();

        let _alias_guard = match &options.alias {
            Some(alias) => Some(self.locks.lock(&format!("alias:{alias}")).await),
            None => None,
        };

        if let Some(alias) = &options.alias {
            if self.find_by_alias(alias).await?.is_some() {
                return Err(AgentError::AliasTaken(alias.clone()));
            }
        }

        let key = match &options.key_id {
            Some(kid) => self.keys.get_key(kid).await?,
            None => {
                let kms = options
                    .kms
                    .as_deref()
                    .or(provider.default_kms())
                    .or(self.keys.default_kms())
                    .ok_or_else(|| AgentError::InvalidArgument("no kms given and no default kms".into()))?
                    .to_string();
                self.keys
                    .create_key(&kms, provider.default_key_type(), KeyMeta::new())
                    .await?
            }
        };
        let _key_guard = self.keys.lock_key(&key.kid).await;
        self.ensure_key_exists(&key).await?;

        let subject = options
            .alias
            .clone()
            .unwrap_or_else(|| format!("{provider_name} identifier"));
        log::debug!("anchoring {subject} with key {} via {provider_name}", key.kid);

        let anchored = with_timeout(
            options.anchor_timeout,
            provider.create_identifier(self.context(), &key, options.alias.as_deref()),
        )
        .await;
        let did = match anchored {
            Ok(did) => did,
            Err(e) => {
                log::warn!("anchoring {subject} failed: {e}");
                return Err(anchoring_error(subject, Some(key.kid.clone()), e));
            }
        };

        if let Some(existing) = self.store.get(&did).await? {
            if existing.is_active() {
                if existing.controller_key_id == key.kid {
                    if options.alias.is_some() && existing.alias != options.alias {
                        return Err(AgentError::Conflict(format!(
                            "{did} is already anchored under alias {}",
                            existing.alias.as_deref().unwrap_or("(none)")
                        )));
                    }
                    return Ok(existing);
                }
                return Err(AgentError::Conflict(format!(
                    "{did} is already controlled by key {}",
                    existing.controller_key_id
                )));
            }
            log::info!("re-creating revoked identifier {did}");
        }

        let now = crate::time::now_micros();
        let identifier = Identifier {
            did,
            alias: options.alias.clone(),
            provider: provider_name,
            controller_key_id: key.kid.clone(),
            keys: vec![key.kid.clone()],
            services: Vec::new(),
            state: IdentifierState::Active,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.store.put(&identifier).await {
            log::error!(
                "{} was anchored but could not be recorded: {e}",
                identifier.did
            );
            return Err(e.into());
        }

        log::info!(
            "created identifier {} via {} (key {})",
            identifier.did,
            identifier.provider,
            identifier.controller_key_id
        );
        Ok(identifier)
    }

    /// Return the active identifier with `alias`, creating it if missing.
    pub async fn get_or_create_identifier(
        &self,
        alias: &str,
        mut options: CreateIdentifierOptions,
    ) -> Result<Identifier> {
        if let Some(existing) = self.find_by_alias(alias).await? {
            return Ok(existing);
        }
        options.alias = Some(alias.to_string());
        match self.create_identifier(options).await {
            Err(AgentError::AliasTaken(_)) => self.get_identifier_by_alias(alias).await,
            other => other,
        }
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Apply one change to an identifier.
    pub async fn update_identifier(&self, did: &str, change: IdentifierChange) -> Result<Identifier> {
        self.update_identifier_within(did, change, None).await
    }

    /// Apply one change, bounding the provider call by `anchor_timeout`.
    ///
    /// On timeout the record is left unchanged although the change may
    /// still land on the substrate.
    pub async fn update_identifier_within(
        &self,
        did: &str,
        change: IdentifierChange,
        anchor_timeout: Option<Duration>,
    ) -> Result<Identifier> {
        let _guard = self.locks.lock(&format!("did:{did}")).await;

        let mut identifier = self.get_identifier(did).await?;
        if !identifier.is_active() {
            return Err(AgentError::IdentifierRevoked(did.to_string()));
        }
        let provider = self.provider(&identifier.provider)?.clone();
        let ctx = self.context();

        match &change {
            IdentifierChange::AddKey { kid } => {
                let key = self.keys.get_key(kid).await?;
                if identifier.keys.contains(kid) {
                    return Err(AgentError::Conflict(format!("{kid} is already a key of {did}")));
                }
                let _key_guard = self.keys.lock_key(kid).await;
                self.ensure_key_exists(&key).await?;
                apply(
                    did,
                    with_timeout(anchor_timeout, provider.add_key(ctx, &identifier, &key)).await,
                )?;
                identifier.keys.push(kid.clone());
            }
            IdentifierChange::RemoveKey { kid } => {
                if *kid == identifier.controller_key_id {
                    return Err(AgentError::InvalidArgument(format!(
                        "{kid} is the controller key of {did}"
                    )));
                }
                if !identifier.keys.contains(kid) {
                    return Err(AgentError::KeyNotFound(kid.clone()));
                }
                apply(
                    did,
                    with_timeout(anchor_timeout, provider.remove_key(ctx, &identifier, kid)).await,
                )?;
                identifier.keys.retain(|k| k != kid);
            }
            IdentifierChange::AddService { service } => {
                if identifier.services.iter().any(|s| s.id == service.id) {
                    return Err(AgentError::Conflict(format!(
                        "service {} already exists on {did}",
                        service.id
                    )));
                }
                apply(
                    did,
                    with_timeout(anchor_timeout, provider.add_service(ctx, &identifier, service)).await,
                )?;
                identifier.services.push(service.clone());
            }
            IdentifierChange::RemoveService { id } => {
                if !identifier.services.iter().any(|s| s.id == *id) {
                    return Err(AgentError::ServiceNotFound(id.clone()));
                }
                apply(
                    did,
                    with_timeout(anchor_timeout, provider.remove_service(ctx, &identifier, id)).await,
                )?;
                identifier.services.retain(|s| s.id != *id);
            }
        }

        identifier.updated_at = crate::time::now_micros();
        self.record_applied(&identifier, &change).await?;
        log::info!("updated identifier {did}: {change:?}");
        Ok(identifier)
    }

    /// Deactivate an identifier and mark it revoked.
    ///
    /// Revoking an already revoked identifier returns it unchanged.
    pub async fn delete_identifier(&self, did: &str) -> Result<Identifier> {
        self.delete_identifier_within(did, None).await
    }

    /// Deactivate an identifier, bounding the provider call by `anchor_timeout`.
    pub async fn delete_identifier_within(
        &self,
        did: &str,
        anchor_timeout: Option<Duration>,
    ) -> Result<Identifier> {
        let _guard = self.locks.lock(&format!("did:{did}")).await;

        let mut identifier = self.get_identifier(did).await?;
        if !identifier.is_active() {
            return Ok(identifier);
        }
        let provider = self.provider(&identifier.provider)?.clone();
        apply(
            did,
            with_timeout(anchor_timeout, provider.deactivate(self.context(), &identifier)).await,
        )?;

        identifier.state = IdentifierState::Revoked;
        identifier.updated_at = crate::time::now_micros();
        if let Err(e) = self.store.put(&identifier).await {
            log::error!("{did} was deactivated but the revocation was not recorded: {e}");
            return Err(AgentError::Divergence(format!(
                "{did} is deactivated but still recorded as active"
            )));
        }
        log::info!("revoked identifier {did}");
        Ok(identifier)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub async fn get_identifier(&self, did: &str) -> Result<Identifier> {
        log::debug!("get identifier {did}");
        self.store
            .get(did)
            .await?
            .ok_or_else(|| AgentError::IdentifierNotFound(did.to_string()))
    }

    pub async fn list_identifiers(&self, filter: &IdentifierFilter) -> Result<Vec<Identifier>> {
        Ok(self.store.list(filter).await?)
    }

    /// Look up the active identifier carrying `alias`.
    pub async fn get_identifier_by_alias(&self, alias: &str) -> Result<Identifier> {
        self.find_by_alias(alias)
            .await?
            .ok_or_else(|| AgentError::IdentifierNotFound(format!("alias {alias}")))
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Identifier>> {
        let filter = IdentifierFilter {
            alias: Some(alias.to_string()),
            state: Some(IdentifierState::Active),
            ..Default::default()
        };
        Ok(self.store.list(&filter).await?.into_iter().next())
    }

    /// Re-read a key under its lock; a concurrent delete may have won.
    async fn ensure_key_exists(&self, key: &Key) -> Result<()> {
        self.keys.get_key(&key.kid).await.map(|_| ())
    }

    async fn record_applied(&self, identifier: &Identifier, change: &IdentifierChange) -> Result<()> {
        if let Err(e) = self.store.put(identifier).await {
            log::error!(
                "{} accepted {change:?} but the store write failed: {e}",
                identifier.did
            );
            return Err(AgentError::Divergence(format!(
                "{} changed on its substrate but not in the store",
                identifier.did
            )));
        }
        Ok(())
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl std::future::Future<Output = ProviderResult<T>>,
) -> ProviderResult<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(ProviderError::Timeout(limit))),
        None => fut.await,
    }
}

fn apply(did: &str, result: ProviderResult<()>) -> Result<()> {
    result.map_err(|e| {
        log::warn!("provider refused change to {did}: {e}");
        anchoring_error(did.to_string(), None, e)
    })
}

/// Translate a provider failure into the agent's anchoring errors.
fn anchoring_error(subject: String, key_id: Option<String>, e: ProviderError) -> AgentError {
    match e {
        ProviderError::Rejected(reason) => AgentError::AnchoringFailed {
            subject,
            key_id,
            reason,
        },
        ProviderError::Timeout(elapsed) => AgentError::AnchoringTimeout {
            subject,
            key_id,
            elapsed,
        },
        ProviderError::Unavailable(reason) => AgentError::ProviderUnavailable {
            subject,
            key_id,
            reason,
        },
        ProviderError::UnsupportedKey(reason) => AgentError::UnsupportedKeyType(reason),
        ProviderError::Agent(inner) => *inner,
    }
}
