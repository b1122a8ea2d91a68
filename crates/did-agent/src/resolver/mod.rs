//! DID resolution: `did:<method>:<id>` to a [`DidDocument`].
//!
//! The resolver routes on the method segment to a registered
//! [`MethodResolver`]. Method resolvers read their substrate directly and
//! never consult the DID store, so foreign and locally managed DIDs
//! resolve the same way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::did::{DidDocument, ParsedDid};
use crate::error::{AgentError, ResolutionError, Result};

/// Resolves DIDs of one method.
#[async_trait]
pub trait MethodResolver: Send + Sync {
    /// The DID method served, e.g. `web`.
    fn method(&self) -> &str;

    async fn resolve(&self, did: &ParsedDid) -> std::result::Result<DidDocument, ResolutionError>;
}

struct CachedDocument {
    document: DidDocument,
    expires_at: Instant,
}

/// Time-bounded document cache.
struct DocumentCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedDocument>>,
}

impl DocumentCache {
    fn get(&self, did: &str) -> Option<DidDocument> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(did) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.document.clone()),
            Some(_) => {
                entries.remove(did);
                None
            }
            None => None,
        }
    }

    fn insert(&self, did: &str, document: &DidDocument) {
        if let Ok(mut entries) = self.entries.lock() {
            let now = Instant::now();
            entries.retain(|_, e| e.expires_at > now);
            entries.insert(
                did.to_string(),
                CachedDocument {
                    document: document.clone(),
                    expires_at: now + self.ttl,
                },
            );
        }
    }
}

/// Routes resolution to method resolvers.
#[derive(Default)]
pub struct DidResolver {
    methods: HashMap<String, Arc<dyn MethodResolver>>,
    cache: Option<DocumentCache>,
}

impl DidResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method resolver. One resolver per method.
    pub fn with_method(mut self, resolver: Arc<dyn MethodResolver>) -> Result<Self> {
        let method = resolver.method().to_string();
        if self.methods.contains_key(&method) {
            return Err(AgentError::DuplicateRegistration(format!("resolver for did:{method}")));
        }
        self.methods.insert(method, resolver);
        Ok(self)
    }

    /// Cache successful resolutions for `ttl`.
    ///
    /// Without this every call reads the substrate.
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(DocumentCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        });
        self
    }

    /// Methods with a registered resolver, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.methods.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Resolve `did` to its current document.
    pub async fn resolve(&self, did: &str) -> Result<DidDocument> {
        let parsed = ParsedDid::parse(did).map_err(|_| AgentError::InvalidDid(did.to_string()))?;
        let resolver = self
            .methods
            .get(&parsed.method)
            .ok_or_else(|| AgentError::UnsupportedMethod(parsed.method.clone()))?;

        if let Some(document) = self.cache.as_ref().and_then(|c| c.get(&parsed.did)) {
            log::debug!("resolved {} from cache", parsed.did);
            return Ok(document);
        }

        log::debug!("resolving {} via did:{}", parsed.did, parsed.method);
        let document = resolver
            .resolve(&parsed)
            .await
            .map_err(|source| {
                if source.class() == crate::error::ErrorClass::Integrity {
                    log::error!("resolver returned a bad document for {}: {source}", parsed.did);
                }
                AgentError::ResolutionFailed {
                    did: parsed.did.clone(),
                    source,
                }
            })?;

        if let Some(cache) = &self.cache {
            cache.insert(&parsed.did, &document);
        }
        Ok(document)
    }
}
