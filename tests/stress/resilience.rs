//! Resilience tests: tampered ciphertexts, corrupted files, wrong secrets,
//! and substrates that go away mid-operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use did_agent::crypto::{SealedBox, SecretBox};
use did_agent::error::VaultError;
use did_agent::methods::{DocumentHost, InMemoryHost};
use did_agent::{
    build_agent, Agent, AgentConfig, AgentError, Environment, ErrorClass, Identifier, Key,
};

fn files_agent(dir: &Path, secret: &str, host: Arc<dyn DocumentHost>) -> Agent {
    let config = AgentConfig {
        kms_secret_key: secret.to_string(),
        storage_dir: dir.to_path_buf(),
        ..Default::default()
    };
    build_agent(&config, Environment::files(host)).unwrap()
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map_or(false, |e| e == "json"))
        .collect()
}

#[test]
fn resilience_every_single_byte_mutation_detected() {
    let vault = SecretBox::from_bytes([0x42; 32]);
    let plaintext = [0xA5u8; 32];
    let sealed = vault.seal(&plaintext).unwrap().to_bytes();
    assert_eq!(&vault.open_bytes(&sealed).unwrap()[..], &plaintext[..]);

    for i in 0..sealed.len() {
        for flip in [0x01u8, 0x80, 0xFF] {
            let mut tampered = sealed.clone();
            tampered[i] ^= flip;
            let result = vault.open_bytes(&tampered);
            assert!(
                matches!(result, Err(VaultError::DecryptionFailed)),
                "mutation of byte {i} with {flip:#04x} was not detected"
            );
        }
    }
}

#[test]
fn resilience_truncated_sealed_box_rejected() {
    let vault = SecretBox::from_bytes([0x42; 32]);
    let sealed = vault.seal(b"secret").unwrap().to_bytes();
    for len in 0..sealed.len() {
        assert!(vault.open_bytes(&sealed[..len]).is_err(), "length {len}");
    }
    assert!(SealedBox::from_bytes(&sealed[..27]).is_err());
}

#[tokio::test]
async fn resilience_tampered_private_key_file_is_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let secret = SecretBox::generate_hex();
    let host: Arc<dyn DocumentHost> = Arc::new(InMemoryHost::new());
    let agent = files_agent(dir.path(), &secret, host);

    let key: Key = agent
        .call("createKey", json!({"kms": "local", "type": "Ed25519"}))
        .await
        .unwrap();

    let files = json_files(&dir.path().join("private-keys"));
    assert_eq!(files.len(), 1);
    let mut file: Value = serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
    let ciphertext = file["record"]["sealed"]["ciphertext"]
        .as_str()
        .unwrap()
        .to_string();
    let mut bytes = hex::decode(&ciphertext).unwrap();
    bytes[0] ^= 0x01;
    file["record"]["sealed"]["ciphertext"] = Value::String(hex::encode(bytes));
    std::fs::write(&files[0], serde_json::to_vec(&file).unwrap()).unwrap();

    let err = agent
        .execute("sign", json!({"kid": key.kid, "data": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::DecryptionFailed), "got {err:?}");
    assert_eq!(err.class(), ErrorClass::Integrity);
    assert!(err.is_integrity());
}

#[tokio::test]
async fn resilience_wrong_secret_cannot_sign() {
    let dir = tempfile::tempdir().unwrap();
    let host: Arc<dyn DocumentHost> = Arc::new(InMemoryHost::new());

    let kid = {
        let agent = files_agent(dir.path(), &SecretBox::generate_hex(), host.clone());
        let key: Key = agent
            .call("createKey", json!({"kms": "local", "type": "Secp256k1"}))
            .await
            .unwrap();
        key.kid
    };

    let agent = files_agent(dir.path(), &SecretBox::generate_hex(), host);
    // Public metadata stays readable.
    let key: Key = agent.call("getKey", json!({"kid": kid})).await.unwrap();
    assert_eq!(key.kid, kid);

    let err = agent
        .execute("sign", json!({"kid": kid, "data": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::DecryptionFailed));
}

#[tokio::test]
async fn resilience_corrupted_key_file_detected() {
    let dir = tempfile::tempdir().unwrap();
    let host: Arc<dyn DocumentHost> = Arc::new(InMemoryHost::new());
    let agent = files_agent(dir.path(), &SecretBox::generate_hex(), host);

    let key: Key = agent
        .call("createKey", json!({"kms": "local", "type": "Ed25519"}))
        .await
        .unwrap();
    let files = json_files(&dir.path().join("keys"));
    assert_eq!(files.len(), 1);

    // Truncate the record file
    let data = std::fs::read(&files[0]).unwrap();
    std::fs::write(&files[0], &data[..data.len() / 2]).unwrap();

    let err = agent
        .execute("getKey", json!({"kid": key.kid}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::StoreCorrupted(_)), "got {err:?}");
    assert!(err.is_integrity());
}

#[tokio::test]
async fn resilience_stray_files_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let host: Arc<dyn DocumentHost> = Arc::new(InMemoryHost::new());
    let agent = files_agent(dir.path(), &SecretBox::generate_hex(), host);
    agent
        .execute("createIdentifier", json!({"alias": "carol"}))
        .await
        .unwrap();

    std::fs::write(dir.path().join("identifiers").join("notes.txt"), b"hello").unwrap();
    let ids: Vec<Identifier> = agent.call("listIdentifiers", json!({})).await.unwrap();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn resilience_host_outage_then_retry_with_same_key() {
    let host = Arc::new(InMemoryHost::new());
    let config = AgentConfig {
        kms_secret_key: SecretBox::generate_hex(),
        ..Default::default()
    };
    let env = Environment {
        host: host.clone(),
        ..Environment::in_memory()
    };
    let agent = build_agent(&config, env).unwrap();

    host.set_offline(true);
    let err = agent
        .execute("createIdentifier", json!({"alias": "dave"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ProviderUnavailable { .. }), "got {err:?}");
    assert_eq!(err.class(), ErrorClass::Transient);
    let kid = err.key_id().unwrap().to_string();

    let ids: Vec<Identifier> = agent.call("listIdentifiers", json!({})).await.unwrap();
    assert!(ids.is_empty(), "failed anchoring leaves no record");
    let keys: Vec<Key> = agent.call("listKeys", json!({})).await.unwrap();
    assert_eq!(keys.len(), 1, "orphaned key is kept");

    host.set_offline(false);
    let id: Identifier = agent
        .call("createIdentifier", json!({"alias": "dave", "keyId": kid}))
        .await
        .unwrap();
    assert_eq!(id.controller_key_id, kid);

    // The alias is now held by the anchored identifier.
    let again = agent
        .execute("createIdentifier", json!({"alias": "dave", "keyId": kid}))
        .await
        .unwrap_err();
    assert!(matches!(again, AgentError::AliasTaken(_)));
    let keys: Vec<Key> = agent.call("listKeys", json!({})).await.unwrap();
    assert_eq!(keys.len(), 1);
}

#[tokio::test]
async fn resilience_resolution_outage_is_not_cached() {
    let host = Arc::new(InMemoryHost::new());
    let config = AgentConfig {
        kms_secret_key: SecretBox::generate_hex(),
        resolver_cache_ttl_secs: Some(300),
        ..Default::default()
    };
    let env = Environment {
        host: host.clone(),
        ..Environment::in_memory()
    };
    let agent = build_agent(&config, env).unwrap();
    let id: Identifier = agent
        .call("createIdentifier", json!({"alias": "erin"}))
        .await
        .unwrap();

    host.set_offline(true);
    let err = agent
        .execute("resolveDID", json!({"didUrl": id.did}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ResolutionFailed { .. }));

    host.set_offline(false);
    agent
        .execute("resolveDID", json!({"didUrl": id.did}))
        .await
        .unwrap();
}
