//! `did:web`: identifiers backed by a document published at a URL.
//!
//! `did:web:example.com` lives at `https://example.com/.well-known/did.json`,
//! `did:web:example.com:users:alice` at
//! `https://example.com/users/alice/did.json`. A port is encoded as `%3A`.
//!
//! Every mutation republishes the complete document. There is no ledger
//! and no confirmation step.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::crypto::keys::KeyType;
use crate::crypto::random::temp_suffix;
use crate::did::provider::{DidProvider, ProviderContext, ProviderResult};
use crate::did::{DidDocument, Identifier, ParsedDid, Service, VerificationMethod};
use crate::error::{AgentError, ProviderError, ResolutionError};
use crate::kms::Key;
use crate::resolver::MethodResolver;

const METHOD: &str = "web";

/// Failures of a document host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host unavailable: {0}")]
    Unavailable(String),

    #[error("invalid document at {url}: {reason}")]
    InvalidDocument { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HostError> for ProviderError {
    fn from(e: HostError) -> Self {
        ProviderError::Unavailable(e.to_string())
    }
}

impl From<HostError> for ResolutionError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::InvalidDocument { reason, .. } => ResolutionError::InvalidDocument(reason),
            other => ResolutionError::Unavailable(other.to_string()),
        }
    }
}

/// Where `did:web` documents are published and fetched, keyed by URL.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    async fn publish(&self, url: &str, document: &DidDocument) -> Result<(), HostError>;

    async fn fetch(&self, url: &str) -> Result<Option<DidDocument>, HostError>;

    /// Remove the document. Returns `false` if nothing was published.
    async fn withdraw(&self, url: &str) -> Result<bool, HostError>;
}

/// Map a `did:web` DID to the URL of its document.
pub fn did_to_url(did: &str) -> Result<String, ResolutionError> {
    let parsed = ParsedDid::parse(did)?;
    if parsed.method != METHOD {
        return Err(ResolutionError::UnsupportedMethod(parsed.method));
    }
    let mut segments = parsed.method_id.split(':');
    let domain = segments
        .next()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ResolutionError::InvalidDid(did.to_string()))?
        .replace("%3A", ":")
        .replace("%3a", ":");
    let path: Vec<&str> = segments.collect();
    if path.is_empty() {
        Ok(format!("https://{domain}/.well-known/did.json"))
    } else {
        Ok(format!("https://{domain}/{}/did.json", path.join("/")))
    }
}

// ── Hosts ─────────────────────────────────────────────────────────────────────

/// In-process host. Can be switched offline to simulate outages.
#[derive(Default)]
pub struct InMemoryHost {
    documents: RwLock<HashMap<String, DidDocument>>,
    offline: AtomicBool,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), HostError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("host is offline".into()));
        }
        Ok(())
    }

    fn poisoned() -> HostError {
        HostError::Unavailable("host lock poisoned".into())
    }
}

#[async_trait]
impl DocumentHost for InMemoryHost {
    async fn publish(&self, url: &str, document: &DidDocument) -> Result<(), HostError> {
        self.check_online()?;
        self.documents
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(url.to_string(), document.clone());
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Option<DidDocument>, HostError> {
        self.check_online()?;
        Ok(self
            .documents
            .read()
            .map_err(|_| Self::poisoned())?
            .get(url)
            .cloned())
    }

    async fn withdraw(&self, url: &str) -> Result<bool, HostError> {
        self.check_online()?;
        Ok(self
            .documents
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(url)
            .is_some())
    }
}

/// Host writing documents under a web root: `<root>/<domain>/<path>/did.json`.
pub struct DirectoryHost {
    root: PathBuf,
}

impl DirectoryHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, HostError> {
        let rest = url.strip_prefix("https://").ok_or_else(|| HostError::InvalidDocument {
            url: url.to_string(),
            reason: "not an https URL".into(),
        })?;
        let mut path = self.root.clone();
        for part in rest.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(HostError::InvalidDocument {
                    url: url.to_string(),
                    reason: "URL path escapes the web root".into(),
                });
            }
            path.push(part);
        }
        Ok(path)
    }
}

#[async_trait]
impl DocumentHost for DirectoryHost {
    async fn publish(&self, url: &str, document: &DidDocument) -> Result<(), HostError> {
        let path = self.path_for(url)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(document).map_err(|e| HostError::InvalidDocument {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let tmp_path = path.with_extension(format!("json.{}.tmp", temp_suffix()));
        tokio::fs::write(&tmp_path, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Option<DidDocument>, HostError> {
        let path = self.path_for(url)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| HostError::InvalidDocument {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn withdraw(&self, url: &str) -> Result<bool, HostError> {
        match tokio::fs::remove_file(self.path_for(url)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Anchors `did:web` identifiers under one domain.
pub struct WebDidProvider {
    domain: String,
    host: Arc<dyn DocumentHost>,
    default_kms: Option<String>,
}

impl WebDidProvider {
    pub fn new(domain: impl Into<String>, host: Arc<dyn DocumentHost>) -> Self {
        Self {
            domain: domain.into(),
            host,
            default_kms: None,
        }
    }

    pub fn with_default_kms(mut self, kms: impl Into<String>) -> Self {
        self.default_kms = Some(kms.into());
        self
    }

    /// The DID a key and alias map to under this provider's domain.
    pub fn did_for(&self, key: &Key, alias: Option<&str>) -> ProviderResult<String> {
        let domain = self.domain.replace(':', "%3A");
        let leaf = match alias {
            Some(alias) => {
                let valid = !alias.is_empty()
                    && alias
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
                if !valid {
                    return Err(ProviderError::Rejected(format!(
                        "alias {alias:?} is not a valid did:web path segment"
                    )));
                }
                alias.to_string()
            }
            None => bs58::encode(key.public_key_bytes()?).into_string(),
        };
        Ok(format!("did:{METHOD}:{domain}:{leaf}"))
    }

    fn url_for(did: &str) -> ProviderResult<String> {
        did_to_url(did).map_err(|e| ProviderError::Rejected(e.to_string()))
    }

    /// Build the full document for `did` from key ids and services.
    async fn document(
        ctx: ProviderContext<'_>,
        did: &str,
        kids: &[String],
        services: &[Service],
    ) -> ProviderResult<DidDocument> {
        let mut document = DidDocument::new(did);
        for kid in kids {
            let key = match ctx.keys.get_key(kid).await {
                Ok(key) => key,
                Err(AgentError::KeyNotFound(_)) => {
                    log::warn!("{did} references missing key {kid}, leaving it out");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            document = document.with_authenticating_method(VerificationMethod::from_public_key(
                format!("{did}#{kid}"),
                did,
                key.key_type,
                key.public_key_hex,
            ));
        }
        for service in services {
            document = document.with_service(service.clone());
        }
        Ok(document)
    }

    async fn republish(
        &self,
        ctx: ProviderContext<'_>,
        did: &str,
        kids: &[String],
        services: &[Service],
    ) -> ProviderResult<()> {
        let document = Self::document(ctx, did, kids, services).await?;
        self.host.publish(&Self::url_for(did)?, &document).await?;
        log::debug!("published did:web document for {did}");
        Ok(())
    }
}

#[async_trait]
impl DidProvider for WebDidProvider {
    fn method(&self) -> &str {
        METHOD
    }

    fn default_key_type(&self) -> KeyType {
        KeyType::Ed25519
    }

    fn default_kms(&self) -> Option<&str> {
        self.default_kms.as_deref()
    }

    async fn create_identifier(
        &self,
        ctx: ProviderContext<'_>,
        key: &Key,
        alias: Option<&str>,
    ) -> ProviderResult<String> {
        let did = self.did_for(key, alias)?;
        let url = Self::url_for(&did)?;

        if let Some(existing) = self.host.fetch(&url).await? {
            if existing.has_public_key(&key.public_key_hex) {
                return Ok(did);
            }
            return Err(ProviderError::Rejected(format!(
                "{url} already serves a document for another key"
            )));
        }

        self.republish(ctx, &did, std::slice::from_ref(&key.kid), &[])
            .await?;
        Ok(did)
    }

    async fn add_key(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        key: &Key,
    ) -> ProviderResult<()> {
        let mut kids = identifier.keys.clone();
        kids.push(key.kid.clone());
        self.republish(ctx, &identifier.did, &kids, &identifier.services)
            .await
    }

    async fn remove_key(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        kid: &str,
    ) -> ProviderResult<()> {
        let kids: Vec<String> = identifier
            .keys
            .iter()
            .filter(|k| *k != kid)
            .cloned()
            .collect();
        self.republish(ctx, &identifier.did, &kids, &identifier.services)
            .await
    }

    async fn add_service(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        service: &Service,
    ) -> ProviderResult<()> {
        let mut services = identifier.services.clone();
        services.push(service.clone());
        self.republish(ctx, &identifier.did, &identifier.keys, &services)
            .await
    }

    async fn remove_service(
        &self,
        ctx: ProviderContext<'_>,
        identifier: &Identifier,
        service_id: &str,
    ) -> ProviderResult<()> {
        let services: Vec<Service> = identifier
            .services
            .iter()
            .filter(|s| s.id != service_id)
            .cloned()
            .collect();
        self.republish(ctx, &identifier.did, &identifier.keys, &services)
            .await
    }

    async fn deactivate(&self, _ctx: ProviderContext<'_>, identifier: &Identifier) -> ProviderResult<()> {
        let url = Self::url_for(&identifier.did)?;
        if !self.host.withdraw(&url).await? {
            log::warn!("{url} was already withdrawn");
        }
        Ok(())
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Resolves `did:web` by fetching the published document.
pub struct WebDidResolver {
    host: Arc<dyn DocumentHost>,
}

impl WebDidResolver {
    pub fn new(host: Arc<dyn DocumentHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl MethodResolver for WebDidResolver {
    fn method(&self) -> &str {
        METHOD
    }

    async fn resolve(&self, did: &ParsedDid) -> Result<DidDocument, ResolutionError> {
        let url = did_to_url(&did.did)?;
        let document = self
            .host
            .fetch(&url)
            .await?
            .ok_or(ResolutionError::NotFound)?;
        if document.id != did.did {
            return Err(ResolutionError::InvalidDocument(format!(
                "{url} describes {} instead of {}",
                document.id, did.did
            )));
        }
        Ok(document)
    }
}
