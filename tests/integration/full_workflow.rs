//! Integration test: full end-to-end workflow.
//!
//! Tests the complete lifecycle:
//! 1. Register a local KMS and a did:web provider
//! 2. Create an identifier with an alias
//! 3. Resolve it and verify a signature against the resolved key
//! 4. Update keys and services
//! 5. Revoke the identifier and delete its key

use std::sync::Arc;

use did_agent::crypto::SecretBox;
use did_agent::did::IdentifierFilter;
use did_agent::kms::KeyFilter;
use did_agent::methods::{DocumentHost, InMemoryHost, WebDidProvider, WebDidResolver};
use did_agent::store::{MemoryDidStore, MemoryKeyStore, MemoryPrivateKeyStore};
use did_agent::{
    AgentError, CreateIdentifierOptions, DidManager, DidResolver, IdentifierChange,
    IdentifierState, KeyManager, KeyMeta, KeyType, LocalKms, Service,
};

struct World {
    keys: Arc<KeyManager>,
    dids: DidManager,
    resolver: DidResolver,
}

fn world() -> World {
    let did_store = Arc::new(MemoryDidStore::new());
    let host = Arc::new(InMemoryHost::new());
    let kms = Arc::new(LocalKms::new(
        Arc::new(MemoryPrivateKeyStore::new()),
        Arc::new(SecretBox::from_bytes([9u8; 32])),
    ));
    let keys = Arc::new(
        KeyManager::new(Arc::new(MemoryKeyStore::new()))
            .with_kms("local", kms)
            .unwrap()
            .with_identifier_store(did_store.clone()),
    );
    let dids = DidManager::new(did_store, keys.clone())
        .with_provider(
            "web",
            Arc::new(WebDidProvider::new("example.com", host.clone())),
        )
        .unwrap();
    let resolver = DidResolver::new()
        .with_method(Arc::new(WebDidResolver::new(host)))
        .unwrap();
    World {
        keys,
        dids,
        resolver,
    }
}

fn web_alice() -> CreateIdentifierOptions {
    CreateIdentifierOptions {
        provider: Some("web".into()),
        kms: Some("local".into()),
        ..CreateIdentifierOptions::with_alias("alice")
    }
}

#[tokio::test]
async fn full_workflow_create_resolve_revoke() {
    let w = world();

    // ── Step 1: Create ─────────────────────────────────────────────────
    let alice = w.dids.create_identifier(web_alice()).await.unwrap();
    assert!(alice.did.starts_with("did:web:"));
    assert_eq!(alice.state, IdentifierState::Active);
    assert_eq!(alice.alias.as_deref(), Some("alice"));

    let keys = w.keys.list_keys(&KeyFilter::default()).await.unwrap();
    assert_eq!(keys.len(), 1, "exactly one new key");
    let key = &keys[0];
    assert_eq!(key.kms, "local");
    assert_eq!(key.kid, alice.controller_key_id);

    // ── Step 2: Resolve ────────────────────────────────────────────────
    let doc = w.resolver.resolve(&alice.did).await.unwrap();
    assert_eq!(doc.id, alice.did);
    assert_eq!(doc.verification_method.len(), 1, "sole verification method");
    let method = &doc.verification_method[0];
    assert_eq!(
        method.public_key_hex.as_deref(),
        Some(key.public_key_hex.as_str())
    );

    let signature = w.keys.sign(&key.kid, b"proof of control").await.unwrap();
    method.verify(b"proof of control", &signature).unwrap();
    assert!(method.verify(b"something else", &signature).is_err());

    // ── Step 3: Update ─────────────────────────────────────────────────
    let extra = w
        .keys
        .create_key("local", KeyType::Secp256k1, KeyMeta::new())
        .await
        .unwrap();
    let alice = w
        .dids
        .update_identifier(
            &alice.did,
            IdentifierChange::AddKey {
                kid: extra.kid.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(alice.keys, vec![key.kid.clone(), extra.kid.clone()]);

    let alice = w
        .dids
        .update_identifier(
            &alice.did,
            IdentifierChange::AddService {
                service: Service::new(
                    format!("{}#inbox", alice.did),
                    "Messaging",
                    "https://example.com/inbox",
                ),
            },
        )
        .await
        .unwrap();
    let doc = w.resolver.resolve(&alice.did).await.unwrap();
    assert_eq!(doc.verification_method.len(), 2);
    assert_eq!(doc.service.len(), 1);
    assert!(doc.has_public_key(&extra.public_key_hex));

    // ── Step 4: Key in use ─────────────────────────────────────────────
    let err = w.keys.delete_key(&key.kid, false).await.unwrap_err();
    assert!(matches!(err, AgentError::KeyInUse { .. }));

    // ── Step 5: Revoke ─────────────────────────────────────────────────
    let revoked = w.dids.delete_identifier(&alice.did).await.unwrap();
    assert_eq!(revoked.state, IdentifierState::Revoked);
    assert!(w.resolver.resolve(&alice.did).await.is_err());

    // Soft delete keeps the record for audit.
    let all = w
        .dids
        .list_identifiers(&IdentifierFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state, IdentifierState::Revoked);

    let outcome = w.keys.delete_key(&key.kid, false).await.unwrap();
    assert!(outcome.warnings.is_empty());
    assert!(matches!(
        w.keys.get_key(&key.kid).await,
        Err(AgentError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn workflow_foreign_did_resolves_without_local_record() {
    let publisher = world();
    let alice = publisher.dids.create_identifier(web_alice()).await.unwrap();

    // A second agent sharing only the hosting substrate.
    let host = Arc::new(InMemoryHost::new());
    let observer = DidResolver::new()
        .with_method(Arc::new(WebDidResolver::new(host.clone())))
        .unwrap();
    assert!(observer.resolve(&alice.did).await.is_err());

    let doc = publisher.resolver.resolve(&alice.did).await.unwrap();
    let url = did_agent::methods::web::did_to_url(&alice.did).unwrap();
    host.publish(&url, &doc).await.unwrap();

    let resolved = observer.resolve(&alice.did).await.unwrap();
    assert_eq!(resolved.verification_method, doc.verification_method);
}

#[tokio::test]
async fn workflow_unsupported_method() {
    let w = world();
    let err = w
        .resolver
        .resolve("did:ethr:0x7e5f4552091a69125d5dfcb7b8c2659029395bdf")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::UnsupportedMethod(m) if m == "ethr"));
}

#[tokio::test]
async fn workflow_every_key_type_signs_and_verifies() {
    let w = world();
    for key_type in KeyType::ALL {
        let key = w
            .keys
            .create_key("local", key_type, KeyMeta::new())
            .await
            .unwrap();
        for data in [&b""[..], &b"x"[..], &[0u8; 1024][..]] {
            let signature = w.keys.sign(&key.kid, data).await.unwrap();
            key.verify(data, &signature).unwrap();
            w.keys.verify(&key.kid, data, &signature).await.unwrap();
        }
    }
}
