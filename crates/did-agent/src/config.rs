//! Agent configuration.
//!
//! Loaded from a JSON file; every field except the vault secret has a
//! default. The secret is never serialized back out.
//!
//! ```json
//! {
//!   "kmsSecretKey": "<64 hex chars>",
//!   "storageDir": "/var/lib/did-agent",
//!   "defaultProvider": "did:web",
//!   "web": { "domain": "example.com" },
//!   "ethr": { "network": "dev", "chainId": 1337 },
//!   "resolverCacheTtlSecs": 300
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::vault::SecretBox;
use crate::error::{AgentError, Result};

/// Registered name of the `did:web` provider.
pub const WEB_PROVIDER: &str = "did:web";

/// Registered name of the `did:ethr` provider for `network`.
pub fn ethr_provider_name(network: &str) -> String {
    format!("did:ethr:{network}")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".did-agent")
}

fn default_kms() -> String {
    "local".to_string()
}

fn default_domain() -> String {
    "localhost".to_string()
}

fn default_confirmation_timeout_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// `did:web` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebConfig {
    /// Domain new `did:web` identifiers are created under.
    #[serde(default = "default_domain")]
    pub domain: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
        }
    }
}

/// `did:ethr` settings. Absent means no ethr provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthrConfig {
    pub network: String,
    pub chain_id: u64,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl EthrConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level agent configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Hex-encoded 32-byte vault secret.
    #[serde(default, skip_serializing)]
    pub kms_secret_key: String,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "default_kms")]
    pub default_kms: String,
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub ethr: Option<EthrConfig>,
    /// Enables resolution caching when set.
    #[serde(default)]
    pub resolver_cache_ttl_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            kms_secret_key: String::new(),
            storage_dir: default_storage_dir(),
            default_kms: default_kms(),
            default_provider: None,
            web: WebConfig::default(),
            ethr: None,
            resolver_cache_ttl_secs: None,
        }
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("kms_secret_key", &"<redacted>")
            .field("storage_dir", &self.storage_dir)
            .field("default_kms", &self.default_kms)
            .field("default_provider", &self.default_provider)
            .field("web", &self.web)
            .field("ethr", &self.ethr)
            .field("resolver_cache_ttl_secs", &self.resolver_cache_ttl_secs)
            .finish()
    }
}

impl AgentConfig {
    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| AgentError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AgentError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Names of the providers this configuration registers.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names = vec![WEB_PROVIDER.to_string()];
        if let Some(ethr) = &self.ethr {
            names.push(ethr_provider_name(&ethr.network));
        }
        names
    }

    /// Check the configuration before any component is built.
    pub fn validate(&self) -> Result<()> {
        if self.kms_secret_key.is_empty() {
            return Err(AgentError::Config("kmsSecretKey is required".into()));
        }
        SecretBox::from_hex(&self.kms_secret_key)?;

        if self.default_kms.is_empty() {
            return Err(AgentError::Config("defaultKms must not be empty".into()));
        }
        if self.web.domain.is_empty() || self.web.domain.contains('/') {
            return Err(AgentError::Config(format!(
                "web.domain {:?} is not a host name",
                self.web.domain
            )));
        }
        if let Some(ethr) = &self.ethr {
            let valid = !ethr.network.is_empty()
                && ethr
                    .network
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(AgentError::Config(format!(
                    "ethr.network {:?} is not a valid network name",
                    ethr.network
                )));
            }
            if ethr.poll_interval_ms == 0 || ethr.confirmation_timeout_ms == 0 {
                return Err(AgentError::Config(
                    "ethr poll interval and confirmation timeout must be positive".into(),
                ));
            }
        }
        if let Some(provider) = &self.default_provider {
            if !self.provider_names().contains(provider) {
                return Err(AgentError::Config(format!(
                    "defaultProvider {provider} is not configured"
                )));
            }
        }
        Ok(())
    }
}
