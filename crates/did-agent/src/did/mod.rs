//! Decentralized identifiers: identity records, documents, method
//! providers, and the DID Manager.
//!
//! An [`Identifier`] is the locally managed record of a DID. It refers to
//! keys by id only; key lifecycle belongs to the Key Manager.

pub mod document;
pub mod manager;
pub mod provider;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

pub use document::{DidDocument, DocumentMetadata, VerificationMethod};
pub use manager::{CreateIdentifierOptions, DidManager};
pub use provider::{DidProvider, ProviderContext};

/// Lifecycle state of a stored identifier.
///
/// An identifier being anchored has no record at all; `create_identifier`
/// writes it as `Active` once the provider confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierState {
    Active,
    Revoked,
}

impl IdentifierState {
    /// Return a stable string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

/// A service endpoint attached to a DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub service_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Service {
    /// Create a service without description.
    pub fn new(
        id: impl Into<String>,
        type_: impl Into<String>,
        service_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            service_endpoint: service_endpoint.into(),
            description: None,
        }
    }
}

/// Locally managed DID record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub did: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Registered name of the provider that anchored this DID.
    pub provider: String,
    /// Key that signs on behalf of this DID.
    pub controller_key_id: String,
    /// Associated key ids in insertion order, controller first.
    pub keys: Vec<String>,
    #[serde(default)]
    pub services: Vec<Service>,
    pub state: IdentifierState,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Identifier {
    /// Return `true` while the identifier has not been revoked.
    pub fn is_active(&self) -> bool {
        self.state == IdentifierState::Active
    }

    /// Return `true` if `kid` is linked to this identifier in any role.
    pub fn references_key(&self, kid: &str) -> bool {
        self.controller_key_id == kid || self.keys.iter().any(|k| k == kid)
    }
}

/// A single mutation of an identifier's document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IdentifierChange {
    AddKey { kid: String },
    RemoveKey { kid: String },
    AddService { service: Service },
    RemoveService { id: String },
}

/// Filter for listing identifiers. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierFilter {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub state: Option<IdentifierState>,
}

impl IdentifierFilter {
    /// Return `true` if `identifier` passes this filter.
    pub fn matches(&self, identifier: &Identifier) -> bool {
        self.provider
            .as_ref()
            .map_or(true, |p| p == &identifier.provider)
            && self
                .alias
                .as_ref()
                .map_or(true, |a| identifier.alias.as_ref() == Some(a))
            && self.state.map_or(true, |s| s == identifier.state)
    }
}

/// A DID split into method and method-specific id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedDid {
    /// The bare DID without path, query or fragment.
    pub did: String,
    pub method: String,
    pub method_id: String,
}

impl ParsedDid {
    /// Parse `did:<method>:<method-specific-id>`.
    ///
    /// A trailing DID URL part (`/path`, `?query`, `#fragment`) is dropped.
    pub fn parse(input: &str) -> Result<Self, ResolutionError> {
        let bare = input
            .split(['#', '?', '/'])
            .next()
            .unwrap_or_default();

        let rest = bare
            .strip_prefix("did:")
            .ok_or_else(|| ResolutionError::InvalidDid(input.to_string()))?;
        let (method, method_id) = rest
            .split_once(':')
            .ok_or_else(|| ResolutionError::InvalidDid(input.to_string()))?;

        let method_ok = !method.is_empty()
            && method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let id_ok = !method_id.is_empty()
            && !method_id.ends_with(':')
            && method_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%'));
        if !method_ok || !id_ok {
            return Err(ResolutionError::InvalidDid(input.to_string()));
        }

        Ok(Self {
            did: bare.to_string(),
            method: method.to_string(),
            method_id: method_id.to_string(),
        })
    }
}

impl fmt::Display for ParsedDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.did)
    }
}
