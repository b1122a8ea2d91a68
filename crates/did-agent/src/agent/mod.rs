//! The agent kernel: plugins, capabilities, and method dispatch.
//!
//! A plugin declares the capabilities it implements. Each capability names
//! a fixed set of methods. [`AgentBuilder::build`] turns the plugin list
//! into a dispatch table once; after that the table never changes.

pub mod plugins;
pub mod setup;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

pub use setup::{build_agent, Environment, StorageBackend};

/// A named contract of agent methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    KeyManager,
    DidManager,
    Resolver,
}

impl Capability {
    /// The methods this capability exposes.
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            Self::KeyManager => &[
                "createKey",
                "importKey",
                "sign",
                "deleteKey",
                "getKey",
                "listKeys",
                "verify",
            ],
            Self::DidManager => &[
                "createIdentifier",
                "updateIdentifier",
                "deleteIdentifier",
                "getIdentifier",
                "listIdentifiers",
                "getIdentifierByAlias",
                "getOrCreateIdentifier",
            ],
            Self::Resolver => &["resolveDID"],
        }
    }
}

/// A component exposed through the agent.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    /// Run one method of a declared capability.
    async fn execute(&self, method: &str, args: Value) -> Result<Value>;
}

/// Collects plugins and builds an [`Agent`].
#[derive(Default)]
pub struct AgentBuilder {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Build the dispatch table.
    ///
    /// Fails with [`AgentError::AmbiguousMethod`] if two plugins expose
    /// the same method, and with [`AgentError::DuplicateRegistration`] if
    /// two plugins share a name.
    pub fn build(self) -> Result<Agent> {
        let mut claims: BTreeMap<&'static str, Vec<usize>> = BTreeMap::new();
        let mut names: Vec<&str> = Vec::with_capacity(self.plugins.len());

        for (index, plugin) in self.plugins.iter().enumerate() {
            if names.contains(&plugin.name()) {
                return Err(AgentError::DuplicateRegistration(format!(
                    "plugin {}",
                    plugin.name()
                )));
            }
            names.push(plugin.name());

            for capability in plugin.capabilities() {
                for &method in capability.methods() {
                    let claimants = claims.entry(method).or_default();
                    if !claimants.contains(&index) {
                        claimants.push(index);
                    }
                }
            }
        }

        let mut table = BTreeMap::new();
        for (method, claimants) in claims {
            if claimants.len() > 1 {
                return Err(AgentError::AmbiguousMethod {
                    method: method.to_string(),
                    plugins: claimants
                        .iter()
                        .map(|&i| self.plugins[i].name().to_string())
                        .collect(),
                });
            }
            table.insert(method.to_string(), self.plugins[claimants[0]].clone());
        }

        log::debug!(
            "agent built with {} plugins and {} methods",
            self.plugins.len(),
            table.len()
        );
        Ok(Agent {
            table,
            plugins: self.plugins,
        })
    }
}

/// Dispatches method calls to plugins.
pub struct Agent {
    table: BTreeMap<String, Arc<dyn Plugin>>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Invoke `method` with JSON arguments.
    pub async fn execute(&self, method: &str, args: Value) -> Result<Value> {
        let plugin = self
            .table
            .get(method)
            .ok_or_else(|| AgentError::MethodNotSupported(method.to_string()))?;
        log::debug!("dispatching {method} to {}", plugin.name());
        plugin.execute(method, args).await
    }

    /// Invoke `method` and decode the result.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T> {
        let value = self.execute(method, args).await?;
        serde_json::from_value(value).map_err(|e| AgentError::Serialization(e.to_string()))
    }

    /// Return `true` if some plugin serves `method`.
    pub fn supports(&self, method: &str) -> bool {
        self.table.contains_key(method)
    }

    /// Every dispatchable method, sorted.
    pub fn methods(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }

    /// Registered plugin names in registration order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }
}
