//! Plugin bindings for the Key Manager, DID Manager and DID Resolver.
//!
//! Arguments and results are JSON objects with camelCase fields.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{Capability, Plugin};
use crate::crypto::keys::KeyType;
use crate::did::{CreateIdentifierOptions, DidManager, IdentifierChange, IdentifierFilter};
use crate::error::{AgentError, Result};
use crate::kms::{KeyFilter, KeyManager, KeyMeta};
use crate::resolver::DidResolver;

/// How `data` arguments are encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataEncoding {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    Hex,
}

impl DataEncoding {
    fn decode(self, data: &str) -> Result<Vec<u8>> {
        match self {
            Self::Utf8 => Ok(data.as_bytes().to_vec()),
            Self::Hex => hex::decode(data)
                .map_err(|e| AgentError::InvalidArgument(format!("data is not hex: {e}"))),
        }
    }
}

fn parse_args<T: DeserializeOwned>(method: &str, args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| AgentError::InvalidArgument(format!("{method}: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| AgentError::Serialization(e.to_string()))
}

fn unknown_method(plugin: &str, method: &str) -> AgentError {
    AgentError::MethodNotSupported(format!("{method} on {plugin}"))
}

// ── Key Manager ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyArgs {
    kms: Option<String>,
    #[serde(rename = "type")]
    key_type: KeyType,
    #[serde(default)]
    meta: KeyMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportKeyArgs {
    kms: Option<String>,
    #[serde(rename = "type")]
    key_type: KeyType,
    private_key_hex: String,
    #[serde(default)]
    meta: KeyMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KidArgs {
    kid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignArgs {
    kid: String,
    data: String,
    #[serde(default)]
    encoding: DataEncoding,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyArgs {
    kid: String,
    data: String,
    #[serde(default)]
    encoding: DataEncoding,
    signature: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteKeyArgs {
    kid: String,
    #[serde(default)]
    force: bool,
}

impl KeyManager {
    fn kms_or_default(&self, kms: Option<String>) -> Result<String> {
        kms.or_else(|| self.default_kms().map(str::to_string))
            .ok_or_else(|| AgentError::InvalidArgument("no kms given and no default kms".into()))
    }
}

#[async_trait]
impl Plugin for KeyManager {
    fn name(&self) -> &str {
        "keyManager"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::KeyManager]
    }

    async fn execute(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            "createKey" => {
                let a: CreateKeyArgs = parse_args(method, args)?;
                let kms = self.kms_or_default(a.kms)?;
                to_json(&self.create_key(&kms, a.key_type, a.meta).await?)
            }
            "importKey" => {
                let a: ImportKeyArgs = parse_args(method, args)?;
                let kms = self.kms_or_default(a.kms)?;
                let private_key = zeroize::Zeroizing::new(hex::decode(&a.private_key_hex).map_err(
                    |_| AgentError::InvalidKeyMaterial("privateKeyHex is not hex".into()),
                )?);
                to_json(&self.import_key(&kms, a.key_type, &private_key, a.meta).await?)
            }
            "sign" => {
                let a: SignArgs = parse_args(method, args)?;
                let data = a.encoding.decode(&a.data)?;
                Ok(Value::String(hex::encode(self.sign(&a.kid, &data).await?)))
            }
            "verify" => {
                let a: VerifyArgs = parse_args(method, args)?;
                let data = a.encoding.decode(&a.data)?;
                let signature = hex::decode(&a.signature)
                    .map_err(|_| AgentError::InvalidArgument("signature is not hex".into()))?;
                match self.verify(&a.kid, &data, &signature).await {
                    Ok(()) => Ok(Value::Bool(true)),
                    Err(AgentError::SignatureInvalid) => Ok(Value::Bool(false)),
                    Err(e) => Err(e),
                }
            }
            "deleteKey" => {
                let a: DeleteKeyArgs = parse_args(method, args)?;
                to_json(&self.delete_key(&a.kid, a.force).await?)
            }
            "getKey" => {
                let a: KidArgs = parse_args(method, args)?;
                to_json(&self.get_key(&a.kid).await?)
            }
            "listKeys" => {
                let filter: KeyFilter = parse_args(method, args)?;
                to_json(&self.list_keys(&filter).await?)
            }
            other => Err(unknown_method(self.name(), other)),
        }
    }
}

// ── DID Manager ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIdentifierArgs {
    provider: Option<String>,
    kms: Option<String>,
    alias: Option<String>,
    key_id: Option<String>,
    anchor_timeout_ms: Option<u64>,
}

impl From<CreateIdentifierArgs> for CreateIdentifierOptions {
    fn from(a: CreateIdentifierArgs) -> Self {
        Self {
            provider: a.provider,
            kms: a.kms,
            alias: a.alias,
            key_id: a.key_id,
            anchor_timeout: a.anchor_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateIdentifierArgs {
    did: String,
    change: IdentifierChange,
    anchor_timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteIdentifierArgs {
    did: String,
    anchor_timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidArgs {
    did: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AliasArgs {
    alias: String,
}

#[async_trait]
impl Plugin for DidManager {
    fn name(&self) -> &str {
        "didManager"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::DidManager]
    }

    async fn execute(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            "createIdentifier" => {
                let a: CreateIdentifierArgs = parse_args(method, args)?;
                to_json(&self.create_identifier(a.into()).await?)
            }
            "updateIdentifier" => {
                let a: UpdateIdentifierArgs = parse_args(method, args)?;
                let limit = a.anchor_timeout_ms.map(Duration::from_millis);
                to_json(&self.update_identifier_within(&a.did, a.change, limit).await?)
            }
            "deleteIdentifier" => {
                let a: DeleteIdentifierArgs = parse_args(method, args)?;
                let limit = a.anchor_timeout_ms.map(Duration::from_millis);
                to_json(&self.delete_identifier_within(&a.did, limit).await?)
            }
            "getIdentifier" => {
                let a: DidArgs = parse_args(method, args)?;
                to_json(&self.get_identifier(&a.did).await?)
            }
            "listIdentifiers" => {
                let filter: IdentifierFilter = parse_args(method, args)?;
                to_json(&self.list_identifiers(&filter).await?)
            }
            "getIdentifierByAlias" => {
                let a: AliasArgs = parse_args(method, args)?;
                to_json(&self.get_identifier_by_alias(&a.alias).await?)
            }
            "getOrCreateIdentifier" => {
                let a: CreateIdentifierArgs = parse_args(method, args)?;
                let alias = a
                    .alias
                    .clone()
                    .ok_or_else(|| AgentError::InvalidArgument("alias is required".into()))?;
                to_json(&self.get_or_create_identifier(&alias, a.into()).await?)
            }
            other => Err(unknown_method(self.name(), other)),
        }
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveArgs {
    #[serde(alias = "did")]
    did_url: String,
}

#[async_trait]
impl Plugin for DidResolver {
    fn name(&self) -> &str {
        "didResolver"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Resolver]
    }

    async fn execute(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            "resolveDID" => {
                let a: ResolveArgs = parse_args(method, args)?;
                to_json(&self.resolve(&a.did_url).await?)
            }
            other => Err(unknown_method(self.name(), other)),
        }
    }
}

/// The standard plugin set over existing components.
pub fn standard_plugins(
    keys: Arc<KeyManager>,
    dids: Arc<DidManager>,
    resolver: Arc<DidResolver>,
) -> Vec<Arc<dyn Plugin>> {
    let keys: Arc<dyn Plugin> = keys;
    let dids: Arc<dyn Plugin> = dids;
    let resolver: Arc<dyn Plugin> = resolver;
    vec![keys, dids, resolver]
}
