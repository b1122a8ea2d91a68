//! Stress test: concurrent identifier creation and mutation.
//!
//! Same-alias creation must produce exactly one identifier, and
//! concurrent updates of one DID must not lose each other's changes.

use std::sync::Arc;

use serde_json::json;

use did_agent::crypto::SecretBox;
use did_agent::{build_agent, Agent, AgentConfig, AgentError, Environment, Identifier, Key};

fn agent() -> Arc<Agent> {
    let config = AgentConfig {
        kms_secret_key: SecretBox::generate_hex(),
        ..Default::default()
    };
    Arc::new(build_agent(&config, Environment::in_memory()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_same_alias_created_once() {
    let agent = agent();
    let mut handles = Vec::new();
    for _ in 0..32 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            agent
                .execute("createIdentifier", json!({"alias": "contested"}))
                .await
        }));
    }

    let mut created = 0;
    let mut taken = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AgentError::AliasTaken(alias)) => {
                assert_eq!(alias, "contested");
                taken += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(taken, 31);

    let ids: Vec<Identifier> = agent.call("listIdentifiers", json!({})).await.unwrap();
    assert_eq!(ids.len(), 1);
    let keys: Vec<Key> = agent.call("listKeys", json!({})).await.unwrap();
    assert_eq!(keys.len(), 1, "losing attempts generate no keys");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_100_distinct_identifiers() {
    let agent = agent();
    let mut handles = Vec::new();
    for i in 0..100 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            agent
                .call::<Identifier>("createIdentifier", json!({"alias": format!("agent-{i}")}))
                .await
        }));
    }

    let mut dids = Vec::new();
    for handle in handles {
        dids.push(handle.await.unwrap().unwrap().did);
    }
    dids.sort();
    dids.dedup();
    assert_eq!(dids.len(), 100);

    let keys: Vec<Key> = agent.call("listKeys", json!({})).await.unwrap();
    assert_eq!(keys.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_updates_not_lost() {
    let agent = agent();
    let id: Identifier = agent
        .call("createIdentifier", json!({"alias": "hub"}))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..24 {
        let agent = agent.clone();
        let did = id.did.clone();
        handles.push(tokio::spawn(async move {
            agent
                .execute(
                    "updateIdentifier",
                    json!({
                        "did": did,
                        "change": {
                            "op": "addService",
                            "service": {
                                "id": format!("{did}#svc-{i}"),
                                "type": "Endpoint",
                                "serviceEndpoint": format!("https://svc-{i}.example")
                            }
                        }
                    }),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let id: Identifier = agent
        .call("getIdentifier", json!({"did": id.did}))
        .await
        .unwrap();
    assert_eq!(id.services.len(), 24);

    let doc: did_agent::DidDocument = agent
        .call("resolveDID", json!({"didUrl": id.did}))
        .await
        .unwrap();
    assert_eq!(doc.service.len(), 24, "hosted document matches the record");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_parallel_signing() {
    let agent = agent();
    let key: Key = agent
        .call("createKey", json!({"kms": "local", "type": "Secp256k1"}))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..200 {
        let agent = agent.clone();
        let kid = key.kid.clone();
        handles.push(tokio::spawn(async move {
            let data = format!("message {i}");
            let signature: String = agent
                .call("sign", json!({"kid": kid, "data": data}))
                .await
                .unwrap();
            (data, signature)
        }));
    }
    for handle in handles {
        let (data, signature) = handle.await.unwrap();
        key.verify(data.as_bytes(), &hex::decode(signature).unwrap())
            .unwrap();
    }
}
