//! DID documents as produced by resolution.
//!
//! Documents are built fresh for each resolution call and are never
//! persisted by the agent. The JSON shape follows the W3C DID Core data
//! model (`@context`, `verificationMethod`, `authentication`, ...).

use serde::{Deserialize, Serialize};

use crate::crypto::keys::KeyType;
use crate::did::Service;
use crate::error::{AgentError, Result};

const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// A public key (or account reference) that can verify on behalf of a DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_account_id: Option<String>,
}

impl VerificationMethod {
    /// Build a verification method carrying raw public key material.
    pub fn from_public_key(
        id: impl Into<String>,
        controller: impl Into<String>,
        key_type: KeyType,
        public_key_hex: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_: key_type.verification_method_type().to_string(),
            controller: controller.into(),
            public_key_hex: Some(public_key_hex.into()),
            blockchain_account_id: None,
        }
    }

    /// The key type implied by the method type, when it carries key material.
    pub fn key_type(&self) -> Option<KeyType> {
        KeyType::ALL
            .into_iter()
            .find(|t| t.verification_method_type() == self.type_)
    }

    /// Verify a signature with this method's public key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let key_type = self.key_type().ok_or_else(|| {
            AgentError::InvalidKeyMaterial(format!("{} carries no public key", self.id))
        })?;
        let public_key_hex = self.public_key_hex.as_deref().ok_or_else(|| {
            AgentError::InvalidKeyMaterial(format!("{} carries no public key", self.id))
        })?;
        crate::crypto::signing::verify_hex(
            key_type,
            public_key_hex,
            message,
            &hex::encode(signature),
        )
    }
}

/// Resolution metadata. Not part of the hosted document itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deactivated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl DocumentMetadata {
    /// Return `true` if no metadata field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A resolved DID document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default)]
    pub assertion_method: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
    #[serde(
        default,
        rename = "didDocumentMetadata",
        skip_serializing_if = "DocumentMetadata::is_empty"
    )]
    pub metadata: DocumentMetadata,
}

impl DidDocument {
    /// Create an empty document for `did`.
    pub fn new(did: impl Into<String>) -> Self {
        Self {
            context: vec![DID_CONTEXT.to_string()],
            id: did.into(),
            verification_method: Vec::new(),
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            service: Vec::new(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Add a verification method usable for authentication and assertions.
    pub fn with_authenticating_method(mut self, method: VerificationMethod) -> Self {
        self.authentication.push(method.id.clone());
        self.assertion_method.push(method.id.clone());
        self.verification_method.push(method);
        self
    }

    /// Add a verification method usable for assertions only.
    pub fn with_assertion_method(mut self, method: VerificationMethod) -> Self {
        self.assertion_method.push(method.id.clone());
        self.verification_method.push(method);
        self
    }

    /// Add a service endpoint.
    pub fn with_service(mut self, service: Service) -> Self {
        self.service.push(service);
        self
    }

    /// Look up a verification method by full id or by `#fragment`.
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        let fragment = id.strip_prefix('#');
        self.verification_method.iter().find(|vm| {
            vm.id == id
                || matches!(
                    (fragment, vm.id.rsplit_once('#')),
                    (Some(wanted), Some((_, have))) if wanted == have
                )
        })
    }

    /// Return `true` if any method carries the given public key.
    pub fn has_public_key(&self, public_key_hex: &str) -> bool {
        self.verification_method
            .iter()
            .any(|vm| vm.public_key_hex.as_deref() == Some(public_key_hex))
    }
}
