//! Standard agent wiring from an [`AgentConfig`].
//!
//! One local KMS, a `did:web` provider, an optional `did:ethr` provider,
//! and resolvers for both methods, exposed as the three standard plugins.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::plugins::standard_plugins;
use crate::agent::{Agent, AgentBuilder};
use crate::config::{ethr_provider_name, AgentConfig, WEB_PROVIDER};
use crate::crypto::vault::SecretBox;
use crate::did::DidManager;
use crate::error::Result;
use crate::kms::{KeyManager, LocalKms};
use crate::methods::ethr::{EthrDidProvider, EthrDidResolver, EthrNetwork};
use crate::methods::ledger::{InMemoryLedger, Ledger};
use crate::methods::web::{DocumentHost, InMemoryHost, WebDidProvider, WebDidResolver};
use crate::resolver::DidResolver;
use crate::store::{
    DidStore, FileDidStore, FileKeyStore, FilePrivateKeyStore, KeyStore, MemoryDidStore,
    MemoryKeyStore, MemoryPrivateKeyStore, PrivateKeyStore,
};

/// Where records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    /// JSON files under `AgentConfig::storage_dir`.
    Files,
}

/// The outside world the agent talks to.
pub struct Environment {
    pub storage: StorageBackend,
    pub host: Arc<dyn DocumentHost>,
    /// Ledger of the configured ethr network. A process-local ledger is
    /// used when absent.
    pub ledger: Option<Arc<dyn Ledger>>,
}

impl Environment {
    /// Everything in memory.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageBackend::Memory,
            host: Arc::new(InMemoryHost::new()),
            ledger: None,
        }
    }

    /// File-backed stores publishing through `host`.
    pub fn files(host: Arc<dyn DocumentHost>) -> Self {
        Self {
            storage: StorageBackend::Files,
            host,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }
}

type Stores = (
    Arc<dyn KeyStore>,
    Arc<dyn PrivateKeyStore>,
    Arc<dyn DidStore>,
);

fn open_stores(config: &AgentConfig, storage: StorageBackend) -> Result<Stores> {
    Ok(match storage {
        StorageBackend::Memory => (
            Arc::new(MemoryKeyStore::new()),
            Arc::new(MemoryPrivateKeyStore::new()),
            Arc::new(MemoryDidStore::new()),
        ),
        StorageBackend::Files => (
            Arc::new(FileKeyStore::open(&config.storage_dir)?),
            Arc::new(FilePrivateKeyStore::open(&config.storage_dir)?),
            Arc::new(FileDidStore::open(&config.storage_dir)?),
        ),
    })
}

/// Build the standard agent.
pub fn build_agent(config: &AgentConfig, env: Environment) -> Result<Agent> {
    config.validate()?;
    let vault = Arc::new(SecretBox::from_hex(&config.kms_secret_key)?);
    let (key_store, private_key_store, did_store) = open_stores(config, env.storage)?;

    let keys = Arc::new(
        KeyManager::new(key_store)
            .with_kms(
                &config.default_kms,
                Arc::new(LocalKms::new(private_key_store, vault)),
            )?
            .with_identifier_store(did_store.clone()),
    );

    let web = WebDidProvider::new(config.web.domain.clone(), env.host.clone())
        .with_default_kms(config.default_kms.clone());
    let mut dids = DidManager::new(did_store, keys.clone()).with_provider(WEB_PROVIDER, Arc::new(web))?;
    let mut resolver = DidResolver::new().with_method(Arc::new(WebDidResolver::new(env.host)))?;

    if let Some(ethr) = &config.ethr {
        let ledger = match env.ledger {
            Some(ledger) => ledger,
            None => {
                log::warn!(
                    "no ledger for ethr network {}, using a process-local ledger",
                    ethr.network
                );
                Arc::new(InMemoryLedger::new(ethr.chain_id))
            }
        };
        if ledger.chain_id() != ethr.chain_id {
            return Err(crate::error::AgentError::Config(format!(
                "ledger serves chain {}, config expects {}",
                ledger.chain_id(),
                ethr.chain_id
            )));
        }
        let network = EthrNetwork::new(ethr.network.clone(), ledger);
        let provider = EthrDidProvider::new(network.clone())
            .with_confirmation(ethr.confirmation_timeout(), ethr.poll_interval())
            .with_default_kms(config.default_kms.clone());
        dids = dids.with_provider(&ethr_provider_name(&ethr.network), Arc::new(provider))?;
        resolver = resolver.with_method(Arc::new(EthrDidResolver::new().with_network(network)))?;
    }

    if let Some(default_provider) = &config.default_provider {
        dids = dids.with_default_provider(default_provider)?;
    }
    if let Some(ttl) = config.resolver_cache_ttl_secs {
        resolver = resolver.with_cache(Duration::from_secs(ttl));
    }

    log::info!(
        "agent ready: kms {}, providers {:?}, resolvers {:?}",
        config.default_kms,
        dids.provider_names(),
        resolver.methods()
    );

    standard_plugins(keys, Arc::new(dids), Arc::new(resolver))
        .into_iter()
        .fold(AgentBuilder::new(), |builder, plugin| builder.plugin(plugin))
        .build()
}
