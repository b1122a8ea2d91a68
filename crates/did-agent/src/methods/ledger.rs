//! Registry ledger for `did:ethr`.
//!
//! A [`Ledger`] accepts signed registry transactions and reports their
//! receipts once mined. [`InMemoryLedger`] is a single-process ledger for
//! development and tests: it checks signatures, ownership and nonces
//! exactly like a registry contract would, and can withhold blocks or go
//! offline on request.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::crypto::keys::KeyType;
use crate::crypto::signing;
use crate::did::Service;
use crate::error::{AgentError, Result};

const TX_DOMAIN: &[u8] = b"did-agent/ethr-registry/v1";

/// Failures talking to a ledger node.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The node refused the transaction before mining it.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// Derive the 0x-prefixed account address of a secp256k1 public key.
///
/// The address is the last 20 bytes of Keccak-256 over the uncompressed
/// point without its `0x04` prefix.
pub fn address_from_public_key(public_key: &[u8]) -> Result<String> {
    let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| AgentError::InvalidKeyMaterial(format!("invalid secp256k1 key: {e}")))?;
    let point = key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    Ok(format!("0x{}", hex::encode(&hash[12..])))
}

/// Return `true` for `0x` followed by 40 hex digits.
pub fn is_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .map_or(false, |h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
}

/// A key delegated to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegate {
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub public_key_hex: String,
}

/// One registry operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RegistryOp {
    #[serde(rename_all = "camelCase")]
    Register { owner: String, public_key_hex: String },
    AddDelegate { delegate: Delegate },
    #[serde(rename_all = "camelCase")]
    RevokeDelegate { public_key_hex: String },
    SetService { service: Service },
    RevokeService { id: String },
    Deactivate,
}

impl RegistryOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::AddDelegate { .. } => "addDelegate",
            Self::RevokeDelegate { .. } => "revokeDelegate",
            Self::SetService { .. } => "setService",
            Self::RevokeService { .. } => "revokeService",
            Self::Deactivate => "deactivate",
        }
    }
}

/// An unsigned registry transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryTransaction {
    /// Address of the identity being changed.
    pub identity: String,
    pub nonce: u64,
    pub op: RegistryOp,
}

impl RegistryTransaction {
    /// Bytes the owner signs, bound to one chain.
    pub fn signing_bytes(&self, chain_id: u64) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self).map_err(|e| AgentError::Serialization(e.to_string()))?;
        let mut out = Vec::with_capacity(TX_DOMAIN.len() + 8 + body.len());
        out.extend_from_slice(TX_DOMAIN);
        out.extend_from_slice(&chain_id.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// A transaction with the signer's public key and signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub tx: RegistryTransaction,
    pub signer_public_key_hex: String,
    pub signature_hex: String,
}

/// Mining status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TxStatus {
    Pending,
    Confirmed { block: u64 },
    Reverted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub status: TxStatus,
}

/// Registry entry of one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryState {
    pub owner: String,
    #[serde(default)]
    pub owner_public_key_hex: Option<String>,
    /// Next expected transaction nonce.
    pub nonce: u64,
    #[serde(default)]
    pub delegates: Vec<Delegate>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub deactivated: bool,
    /// Number of applied changes.
    pub version: u64,
    pub updated_block: u64,
}

/// A registry ledger node.
#[async_trait]
pub trait Ledger: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Submit a transaction and return its hash.
    async fn submit(&self, tx: SignedTransaction) -> std::result::Result<String, LedgerError>;

    /// Receipt of a submitted transaction. `None` if the hash is unknown.
    async fn receipt(&self, tx_hash: &str) -> std::result::Result<Option<TxReceipt>, LedgerError>;

    /// Current registry entry. `None` if the identity never registered.
    async fn registry_state(&self, identity: &str) -> std::result::Result<Option<RegistryState>, LedgerError>;
}

/// How the in-memory ledger treats submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerMode {
    /// Mine every transaction on submit.
    Immediate,
    /// Queue transactions until [`InMemoryLedger::mine`].
    Withhold,
    /// Revert every transaction with the given reason.
    Revert(String),
    /// Refuse all calls.
    Offline,
}

#[derive(Default)]
struct LedgerState {
    block: u64,
    pending: Vec<(String, SignedTransaction)>,
    receipts: HashMap<String, TxReceipt>,
    registry: HashMap<String, RegistryState>,
}

/// Single-process registry ledger.
pub struct InMemoryLedger {
    chain_id: u64,
    mode: Mutex<LedgerMode>,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            mode: Mutex::new(LedgerMode::Immediate),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn set_mode(&self, mode: LedgerMode) {
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
    }

    fn mode(&self) -> std::result::Result<LedgerMode, LedgerError> {
        let mode = self
            .mode
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))?
            .clone();
        if mode == LedgerMode::Offline {
            return Err(LedgerError::Unavailable("ledger node is offline".into()));
        }
        Ok(mode)
    }

    fn state(&self) -> std::result::Result<std::sync::MutexGuard<'_, LedgerState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))
    }

    /// Mine every queued transaction in submission order. Returns how many.
    pub fn mine(&self) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        let pending = std::mem::take(&mut state.pending);
        let count = pending.len();
        for (hash, tx) in pending {
            state.mine_one(hash, &tx);
        }
        count
    }

    /// Number of transactions waiting to be mined.
    pub fn pending_count(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }
}

impl LedgerState {
    fn mine_one(&mut self, hash: String, tx: &SignedTransaction) {
        self.block += 1;
        let status = match self.apply(tx) {
            Ok(()) => TxStatus::Confirmed { block: self.block },
            Err(reason) => {
                log::debug!("ledger reverted {hash}: {reason}");
                TxStatus::Reverted { reason }
            }
        };
        self.receipts.insert(hash.clone(), TxReceipt { tx_hash: hash, status });
    }

    fn apply(&mut self, signed: &SignedTransaction) -> std::result::Result<(), String> {
        let tx = &signed.tx;
        let signer_key = hex::decode(&signed.signer_public_key_hex).map_err(|e| e.to_string())?;
        let signer = address_from_public_key(&signer_key).map_err(|e| e.to_string())?;

        let existing = self.registry.get(&tx.identity).cloned();
        let mut entry = match (&existing, &tx.op) {
            (None, RegistryOp::Register { owner, public_key_hex }) => RegistryState {
                owner: owner.clone(),
                owner_public_key_hex: Some(public_key_hex.clone()),
                nonce: 0,
                delegates: Vec::new(),
                services: Vec::new(),
                deactivated: false,
                version: 0,
                updated_block: self.block,
            },
            (None, _) => return Err(format!("{} is not registered", tx.identity)),
            (Some(_), RegistryOp::Register { .. }) => {
                return Err(format!("{} is already registered", tx.identity))
            }
            (Some(entry), _) => entry.clone(),
        };

        if entry.deactivated {
            return Err(format!("{} is deactivated", tx.identity));
        }
        if existing.is_none() && signer != tx.identity {
            return Err("only the identity itself can register".into());
        }
        if signer != entry.owner {
            return Err(format!("{signer} is not the owner of {}", tx.identity));
        }
        if tx.nonce != entry.nonce {
            return Err(format!("expected nonce {}, got {}", entry.nonce, tx.nonce));
        }

        match &tx.op {
            RegistryOp::Register { .. } => {}
            RegistryOp::AddDelegate { delegate } => {
                if entry.delegates.contains(delegate) {
                    return Err("delegate already present".into());
                }
                entry.delegates.push(delegate.clone());
            }
            RegistryOp::RevokeDelegate { public_key_hex } => {
                let before = entry.delegates.len();
                entry.delegates.retain(|d| d.public_key_hex != *public_key_hex);
                if entry.delegates.len() == before {
                    return Err("no such delegate".into());
                }
            }
            RegistryOp::SetService { service } => {
                entry.services.retain(|s| s.id != service.id);
                entry.services.push(service.clone());
            }
            RegistryOp::RevokeService { id } => {
                let before = entry.services.len();
                entry.services.retain(|s| s.id != *id);
                if entry.services.len() == before {
                    return Err(format!("no service {id}"));
                }
            }
            RegistryOp::Deactivate => entry.deactivated = true,
        }

        entry.nonce += 1;
        entry.version += 1;
        entry.updated_block = self.block;
        self.registry.insert(tx.identity.clone(), entry);
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn submit(&self, tx: SignedTransaction) -> std::result::Result<String, LedgerError> {
        let mode = self.mode()?;

        let message = tx
            .tx
            .signing_bytes(self.chain_id)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        signing::verify_hex(
            KeyType::Secp256k1,
            &tx.signer_public_key_hex,
            &message,
            &tx.signature_hex,
        )
        .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&message);
        hasher.update(tx.signature_hex.as_bytes());
        let hash = format!("0x{}", hex::encode(hasher.finalize()));

        let mut state = self.state()?;
        match mode {
            LedgerMode::Immediate => state.mine_one(hash.clone(), &tx),
            LedgerMode::Withhold => {
                state.receipts.insert(
                    hash.clone(),
                    TxReceipt {
                        tx_hash: hash.clone(),
                        status: TxStatus::Pending,
                    },
                );
                state.pending.push((hash.clone(), tx));
            }
            LedgerMode::Revert(reason) => {
                state.receipts.insert(
                    hash.clone(),
                    TxReceipt {
                        tx_hash: hash.clone(),
                        status: TxStatus::Reverted { reason },
                    },
                );
            }
            LedgerMode::Offline => {
                return Err(LedgerError::Unavailable("ledger node is offline".into()))
            }
        }
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: &str) -> std::result::Result<Option<TxReceipt>, LedgerError> {
        self.mode()?;
        Ok(self.state()?.receipts.get(tx_hash).cloned())
    }

    async fn registry_state(&self, identity: &str) -> std::result::Result<Option<RegistryState>, LedgerError> {
        self.mode()?;
        Ok(self.state()?.registry.get(identity).cloned())
    }
}
