//! did-agent: a pluggable identity agent.
//!
//! Keys live behind named key management backends, identifiers are
//! anchored by per-method DID providers, and documents are resolved
//! through per-method resolvers. An [`Agent`] exposes all three as
//! string-named methods dispatched to plugins.

pub mod agent;
pub mod config;
pub mod crypto;
pub mod did;
pub mod error;
pub mod kms;
pub mod locks;
pub mod methods;
pub mod resolver;
pub mod store;
pub mod time;

// Re-export primary types
pub use agent::{build_agent, Agent, AgentBuilder, Capability, Environment, Plugin, StorageBackend};
pub use config::AgentConfig;
pub use crypto::{KeyType, SecretBox};
pub use error::{AgentError, ErrorClass, Result};

pub use did::{
    CreateIdentifierOptions, DidDocument, DidManager, DidProvider, Identifier, IdentifierChange,
    IdentifierState, Service,
};
pub use kms::{DeleteKeyOutcome, Key, KeyManagementSystem, KeyManager, KeyMeta, LocalKms};
pub use resolver::{DidResolver, MethodResolver};
