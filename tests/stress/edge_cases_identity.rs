//! Edge case tests: unknown names, revoked identifiers, key links,
//! malformed DIDs, and key types a method cannot use.

use serde_json::{json, Value};

use did_agent::config::EthrConfig;
use did_agent::crypto::SecretBox;
use did_agent::kms::ConsistencyWarning;
use did_agent::{
    build_agent, Agent, AgentConfig, AgentError, DeleteKeyOutcome, Environment, ErrorClass,
    Identifier, IdentifierState, Key,
};

fn agent() -> Agent {
    let config = AgentConfig {
        kms_secret_key: SecretBox::generate_hex(),
        ethr: Some(EthrConfig {
            network: "dev".into(),
            chain_id: 1337,
            confirmation_timeout_ms: 500,
            poll_interval_ms: 5,
        }),
        ..Default::default()
    };
    build_agent(&config, Environment::in_memory()).unwrap()
}

async fn create(agent: &Agent, args: Value) -> Identifier {
    agent.call("createIdentifier", args).await.unwrap()
}

fn change(did: &str, change: Value) -> Value {
    json!({ "did": did, "change": change })
}

// === Unknown names ===

#[tokio::test]
async fn edge_unknown_provider_and_kms() {
    let agent = agent();
    let err = agent
        .execute("createIdentifier", json!({"provider": "did:key"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnknownProvider(_)));

    let err = agent
        .execute("createKey", json!({"kms": "hsm", "type": "Ed25519"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnknownKms(_)));
    assert_eq!(err.class(), ErrorClass::NotFound);

    let err = agent
        .execute("createKey", json!({"kms": "local", "type": "Rsa"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidArgument(_)));
}

#[tokio::test]
async fn edge_unknown_identifier() {
    let agent = agent();
    for (method, args) in [
        ("getIdentifier", json!({"did": "did:web:localhost:ghost"})),
        ("deleteIdentifier", json!({"did": "did:web:localhost:ghost"})),
        (
            "updateIdentifier",
            change("did:web:localhost:ghost", json!({"op": "removeService", "id": "x"})),
        ),
        ("getIdentifierByAlias", json!({"alias": "ghost"})),
    ] {
        let err = agent.execute(method, args).await.unwrap_err();
        assert!(
            matches!(err, AgentError::IdentifierNotFound(_)),
            "{method}: {err:?}"
        );
    }
}

// === Revocation ===

#[tokio::test]
async fn edge_revoked_identifier_is_frozen() {
    let agent = agent();
    let id = create(&agent, json!({"alias": "frozen"})).await;

    let first: Identifier = agent
        .call("deleteIdentifier", json!({"did": id.did}))
        .await
        .unwrap();
    let second: Identifier = agent
        .call("deleteIdentifier", json!({"did": id.did}))
        .await
        .unwrap();
    assert_eq!(first, second, "revocation is idempotent");
    assert_eq!(second.state, IdentifierState::Revoked);

    let err = agent
        .execute(
            "updateIdentifier",
            change(
                &id.did,
                json!({"op": "addService", "service": {"id": "#s", "type": "T", "serviceEndpoint": "https://s"}}),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::IdentifierRevoked(_)));

    // Alias and DID are free again once revoked.
    let fresh = create(&agent, json!({"alias": "frozen"})).await;
    assert_eq!(fresh.state, IdentifierState::Active);
    let all: Vec<Identifier> = agent.call("listIdentifiers", json!({})).await.unwrap();
    assert!(!all.is_empty());
    let active: Vec<Identifier> = agent
        .call("listIdentifiers", json!({"state": "active"}))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn edge_delete_key_in_use_then_after_revoke() {
    let agent = agent();
    let id = create(&agent, json!({"alias": "holder"})).await;

    let err = agent
        .execute("deleteKey", json!({"kid": id.controller_key_id}))
        .await
        .unwrap_err();
    match &err {
        AgentError::KeyInUse { kid, dids } => {
            assert_eq!(kid, &id.controller_key_id);
            assert_eq!(dids, &vec![id.did.clone()]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.class(), ErrorClass::Conflict);

    agent
        .execute("deleteIdentifier", json!({"did": id.did}))
        .await
        .unwrap();
    let outcome: DeleteKeyOutcome = agent
        .call("deleteKey", json!({"kid": id.controller_key_id}))
        .await
        .unwrap();
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn edge_forced_delete_reports_dangling_reference() {
    let agent = agent();
    let id = create(&agent, json!({"alias": "dangling"})).await;

    let outcome: DeleteKeyOutcome = agent
        .call(
            "deleteKey",
            json!({"kid": id.controller_key_id, "force": true}),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome.warnings,
        vec![ConsistencyWarning::DanglingKeyReference {
            did: id.did.clone(),
            kid: id.controller_key_id.clone(),
        }]
    );
}

// === Key links ===

#[tokio::test]
async fn edge_key_link_rules() {
    let agent = agent();
    let id = create(&agent, json!({"alias": "links"})).await;

    let err = agent
        .execute(
            "updateIdentifier",
            change(&id.did, json!({"op": "removeKey", "kid": id.controller_key_id})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidArgument(_)));

    let err = agent
        .execute(
            "updateIdentifier",
            change(&id.did, json!({"op": "addKey", "kid": id.controller_key_id})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Conflict(_)));

    let err = agent
        .execute(
            "updateIdentifier",
            change(&id.did, json!({"op": "addKey", "kid": "00ff"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::KeyNotFound(_)));

    let err = agent
        .execute(
            "updateIdentifier",
            change(&id.did, json!({"op": "removeService", "id": "#nothing"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ServiceNotFound(_)));

    let extra: Key = agent
        .call("createKey", json!({"kms": "local", "type": "Ed25519"}))
        .await
        .unwrap();
    agent
        .execute(
            "updateIdentifier",
            change(&id.did, json!({"op": "addKey", "kid": extra.kid})),
        )
        .await
        .unwrap();
    let id: Identifier = agent
        .call(
            "updateIdentifier",
            change(&id.did, json!({"op": "removeKey", "kid": extra.kid})),
        )
        .await
        .unwrap();
    assert_eq!(id.keys, vec![id.controller_key_id.clone()]);

    // Unlinked, the key is free to delete.
    agent
        .execute("deleteKey", json!({"kid": extra.kid}))
        .await
        .unwrap();
}

// === Malformed input ===

#[tokio::test]
async fn edge_malformed_dids() {
    let agent = agent();
    for did in ["", "not-a-did", "did:", "did:web", "did:WEB:x", "did:web:", "did:web:a:"] {
        let err = agent
            .execute("resolveDID", json!({"didUrl": did}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidDid(_)), "{did:?}: {err:?}");
    }
}

#[tokio::test]
async fn edge_did_url_fragment_resolves_base_document() {
    let agent = agent();
    let id = create(&agent, json!({"alias": "fragment"})).await;
    let doc: did_agent::DidDocument = agent
        .call(
            "resolveDID",
            json!({"didUrl": format!("{}#{}", id.did, id.controller_key_id)}),
        )
        .await
        .unwrap();
    assert_eq!(doc.id, id.did);
}

#[tokio::test]
async fn edge_invalid_web_alias_is_rejected_not_transient() {
    let agent = agent();
    let err = agent
        .execute("createIdentifier", json!({"alias": "has space"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::AnchoringFailed { .. }), "{err:?}");
    assert_eq!(err.class(), ErrorClass::Conflict);
}

// === Key types ===

#[tokio::test]
async fn edge_ethr_refuses_ed25519_controller() {
    let agent = agent();
    let key: Key = agent
        .call("createKey", json!({"kms": "local", "type": "Ed25519"}))
        .await
        .unwrap();
    let err = agent
        .execute(
            "createIdentifier",
            json!({"provider": "did:ethr:dev", "keyId": key.kid}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnsupportedKeyType(_)), "{err:?}");

    let ids: Vec<Identifier> = agent.call("listIdentifiers", json!({})).await.unwrap();
    assert!(ids.is_empty());
}

#[tokio::test]
async fn edge_ethr_did_from_known_private_key() {
    let agent = agent();
    let key: Key = agent
        .call(
            "importKey",
            json!({
                "kms": "local",
                "type": "Secp256k1",
                "privateKeyHex": "0000000000000000000000000000000000000000000000000000000000000001"
            }),
        )
        .await
        .unwrap();
    let id = create(
        &agent,
        json!({"provider": "did:ethr:dev", "keyId": key.kid}),
    )
    .await;
    assert_eq!(
        id.did,
        "did:ethr:dev:0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
    );
}
