//! Integration test: the agent surface.
//!
//! Every operation goes through `Agent::execute` with JSON arguments, the
//! way a remote caller would drive it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use did_agent::crypto::SecretBox;
use did_agent::methods::{InMemoryLedger, LedgerMode};
use did_agent::{
    build_agent, Agent, AgentConfig, AgentError, Capability, DidDocument, Environment,
    ErrorClass, Identifier, Key, Plugin,
};

fn config() -> AgentConfig {
    AgentConfig {
        kms_secret_key: SecretBox::generate_hex(),
        ethr: Some(did_agent::config::EthrConfig {
            network: "dev".into(),
            chain_id: 1337,
            confirmation_timeout_ms: 200,
            poll_interval_ms: 5,
        }),
        ..Default::default()
    }
}

fn agent_with_ledger() -> (Agent, Arc<InMemoryLedger>) {
    let ledger = Arc::new(InMemoryLedger::new(1337));
    let agent = build_agent(
        &config(),
        Environment::in_memory().with_ledger(ledger.clone()),
    )
    .unwrap();
    (agent, ledger)
}

#[tokio::test]
async fn dispatch_exposes_all_operations() {
    let (agent, _) = agent_with_ledger();
    for method in [
        "createKey",
        "importKey",
        "sign",
        "deleteKey",
        "createIdentifier",
        "updateIdentifier",
        "deleteIdentifier",
        "getIdentifier",
        "listIdentifiers",
        "resolveDID",
    ] {
        assert!(agent.supports(method), "{method} missing");
    }
    assert_eq!(
        agent.plugin_names(),
        vec!["keyManager", "didManager", "didResolver"]
    );

    let err = agent.execute("createPresentation", json!({})).await.unwrap_err();
    assert!(matches!(err, AgentError::MethodNotSupported(_)));
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn dispatch_key_lifecycle() {
    let (agent, _) = agent_with_ledger();
    let key: Key = agent
        .call("createKey", json!({"kms": "local", "type": "Ed25519"}))
        .await
        .unwrap();

    let signature: String = agent
        .call("sign", json!({"kid": key.kid, "data": "hello"}))
        .await
        .unwrap();
    let valid: bool = agent
        .call(
            "verify",
            json!({"kid": key.kid, "data": "hello", "signature": signature}),
        )
        .await
        .unwrap();
    assert!(valid);
    let valid: bool = agent
        .call(
            "verify",
            json!({"kid": key.kid, "data": "68656c6c6f", "encoding": "hex", "signature": signature}),
        )
        .await
        .unwrap();
    assert!(valid, "hex and utf8 encodings of the same bytes agree");

    let keys: Vec<Key> = agent.call("listKeys", json!({"type": "Ed25519"})).await.unwrap();
    assert_eq!(keys.len(), 1);

    agent
        .execute("deleteKey", json!({"kid": key.kid}))
        .await
        .unwrap();
    let err = agent
        .execute("getKey", json!({"kid": key.kid}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::KeyNotFound(_)));
}

#[tokio::test]
async fn dispatch_import_is_idempotent() {
    let (agent, _) = agent_with_ledger();
    let args = json!({
        "kms": "local",
        "type": "Secp256k1",
        "privateKeyHex": "0000000000000000000000000000000000000000000000000000000000000001",
    });
    let first: Key = agent.call("importKey", args.clone()).await.unwrap();
    let second: Key = agent.call("importKey", args).await.unwrap();
    assert_eq!(first.kid, second.kid);

    let keys: Vec<Key> = agent.call("listKeys", json!({})).await.unwrap();
    assert_eq!(keys.len(), 1);
}

#[tokio::test]
async fn dispatch_ethr_identifier() {
    let (agent, _) = agent_with_ledger();
    let id: Identifier = agent
        .call(
            "createIdentifier",
            json!({"provider": "did:ethr:dev", "alias": "treasury"}),
        )
        .await
        .unwrap();
    assert!(id.did.starts_with("did:ethr:dev:0x"));

    let doc: DidDocument = agent
        .call("resolveDID", json!({"didUrl": id.did}))
        .await
        .unwrap();
    assert!(doc.verification_method("#controller").is_some());

    let updated: Identifier = agent
        .call(
            "updateIdentifier",
            json!({
                "did": id.did,
                "change": {
                    "op": "addService",
                    "service": {
                        "id": format!("{}#hub", id.did),
                        "type": "Hub",
                        "serviceEndpoint": "https://hub.example"
                    }
                }
            }),
        )
        .await
        .unwrap();
    assert_eq!(updated.services.len(), 1);

    let doc: DidDocument = agent
        .call("resolveDID", json!({"did": id.did}))
        .await
        .unwrap();
    assert_eq!(doc.service.len(), 1);
}

#[tokio::test]
async fn dispatch_timeout_is_transient_and_retryable() {
    let (agent, ledger) = agent_with_ledger();
    ledger.set_mode(LedgerMode::Withhold);

    let err = agent
        .execute(
            "createIdentifier",
            json!({"provider": "did:ethr:dev", "alias": "slow"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AnchoringTimeout { .. }));
    assert_eq!(err.class(), ErrorClass::Transient);
    let kid = err.key_id().unwrap().to_string();

    let ids: Vec<Identifier> = agent.call("listIdentifiers", json!({})).await.unwrap();
    assert!(ids.is_empty(), "no record before confirmation");

    ledger.mine();
    ledger.set_mode(LedgerMode::Immediate);
    let id: Identifier = agent
        .call(
            "createIdentifier",
            json!({"provider": "did:ethr:dev", "alias": "slow", "keyId": kid}),
        )
        .await
        .unwrap();
    assert_eq!(id.controller_key_id, kid);

    let keys: Vec<Key> = agent.call("listKeys", json!({})).await.unwrap();
    assert_eq!(keys.len(), 1, "retry did not create a second key");
}

#[tokio::test]
async fn dispatch_reanchoring_keeps_the_recorded_alias() {
    let (agent, _) = agent_with_ledger();
    let id: Identifier = agent
        .call(
            "createIdentifier",
            json!({"provider": "did:ethr:dev", "alias": "treasury"}),
        )
        .await
        .unwrap();
    let kid = id.controller_key_id.clone();

    let same: Identifier = agent
        .call(
            "createIdentifier",
            json!({"provider": "did:ethr:dev", "keyId": kid}),
        )
        .await
        .unwrap();
    assert_eq!(same, id);

    let err = agent
        .execute(
            "createIdentifier",
            json!({"provider": "did:ethr:dev", "alias": "vault", "keyId": kid}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Conflict(_)), "{err:?}");
    assert_eq!(err.class(), ErrorClass::Conflict);
    assert!(matches!(
        agent
            .execute("getIdentifierByAlias", json!({"alias": "vault"}))
            .await,
        Err(AgentError::IdentifierNotFound(_))
    ));
}

#[tokio::test]
async fn dispatch_revert_is_anchoring_failure() {
    let (agent, ledger) = agent_with_ledger();
    ledger.set_mode(LedgerMode::Revert("registry paused".into()));
    let err = agent
        .execute("createIdentifier", json!({"provider": "did:ethr:dev"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AnchoringFailed { .. }));
    assert!(err.key_id().is_some(), "orphaned key is reported");
}

#[tokio::test]
async fn dispatch_bad_arguments_are_invalid() {
    let (agent, _) = agent_with_ledger();
    let err = agent
        .execute("sign", json!({"data": "no kid"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidArgument(_)));
    assert_eq!(err.class(), ErrorClass::Invalid);
}

struct Shadow;

#[async_trait]
impl Plugin for Shadow {
    fn name(&self) -> &str {
        "shadowResolver"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Resolver]
    }

    async fn execute(&self, _method: &str, _args: Value) -> did_agent::Result<Value> {
        Ok(Value::Null)
    }
}

#[test]
fn dispatch_second_resolver_plugin_is_ambiguous() {
    let err = Agent::builder()
        .plugin(Arc::new(Shadow))
        .plugin(Arc::new(did_agent::DidResolver::new()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, AgentError::AmbiguousMethod { method, .. } if method == "resolveDID"));
}
