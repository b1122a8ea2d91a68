//! JSON-file stores.
//!
//! Each record lives in its own file named after the hex-encoded record
//! id, so any DID or kid maps to a safe file name. File format:
//!
//! ```json
//! { "version": 1, "record": { ... } }
//! ```
//!
//! Writes go to a sibling temporary file that is then renamed into place,
//! so readers never observe a partially written record.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{DidStore, KeyStore, PrivateKeyRecord, PrivateKeyStore, StoreResult};
use crate::crypto::random::temp_suffix;
use crate::did::{Identifier, IdentifierFilter};
use crate::error::StoreError;
use crate::kms::{Key, KeyFilter};

const RECORD_FILE_VERSION: u32 = 1;

const KEYS_DIR: &str = "keys";
const PRIVATE_KEYS_DIR: &str = "private-keys";
const IDENTIFIERS_DIR: &str = "identifiers";

/// Wrapper written to disk for each record.
#[derive(Serialize, Deserialize)]
struct RecordFile<T> {
    version: u32,
    record: T,
}

/// A record with a stable id.
pub trait StoredRecord: Clone + Serialize + DeserializeOwned + Send + Sync {
    fn record_id(&self) -> &str;
}

impl StoredRecord for Key {
    fn record_id(&self) -> &str {
        &self.kid
    }
}

impl StoredRecord for PrivateKeyRecord {
    fn record_id(&self) -> &str {
        &self.kid
    }
}

impl StoredRecord for Identifier {
    fn record_id(&self) -> &str {
        &self.did
    }
}

/// Directory of JSON record files.
pub struct JsonDirStore<T> {
    dir: PathBuf,
    _record: PhantomData<fn() -> T>,
}

/// File-backed [`KeyStore`].
pub type FileKeyStore = JsonDirStore<Key>;
/// File-backed [`PrivateKeyStore`].
pub type FilePrivateKeyStore = JsonDirStore<PrivateKeyRecord>;
/// File-backed [`DidStore`].
pub type FileDidStore = JsonDirStore<Identifier>;

impl JsonDirStore<Key> {
    /// Open the key store under `storage_dir/keys`.
    pub fn open(storage_dir: &Path) -> StoreResult<Self> {
        Self::in_dir(storage_dir.join(KEYS_DIR))
    }
}

impl JsonDirStore<PrivateKeyRecord> {
    /// Open the sealed private key store under `storage_dir/private-keys`.
    pub fn open(storage_dir: &Path) -> StoreResult<Self> {
        Self::in_dir(storage_dir.join(PRIVATE_KEYS_DIR))
    }
}

impl JsonDirStore<Identifier> {
    /// Open the identifier store under `storage_dir/identifiers`.
    pub fn open(storage_dir: &Path) -> StoreResult<Self> {
        Self::in_dir(storage_dir.join(IDENTIFIERS_DIR))
    }
}

impl<T: StoredRecord> JsonDirStore<T> {
    /// Use `dir` as the record directory, creating it if needed.
    pub fn in_dir(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            _record: PhantomData,
        })
    }

    /// The record directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(id.as_bytes())))
    }

    async fn read_record(&self, id: &str, path: &Path) -> StoreResult<Option<T>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: RecordFile<T> =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupted {
                id: id.to_string(),
                reason: format!("unreadable record file: {e}"),
            })?;

        if file.version != RECORD_FILE_VERSION {
            return Err(StoreError::Corrupted {
                id: id.to_string(),
                reason: format!("unsupported record version {}", file.version),
            });
        }
        if file.record.record_id() != id {
            return Err(StoreError::Corrupted {
                id: id.to_string(),
                reason: format!("file holds record {}", file.record.record_id()),
            });
        }

        Ok(Some(file.record))
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<T>> {
        self.read_record(id, &self.path_for(id)).await
    }

    async fn put_record(&self, record: &T) -> StoreResult<()> {
        let file = RecordFile {
            version: RECORD_FILE_VERSION,
            record: record.clone(),
        };
        let data = serde_json::to_vec_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(&self.path_for(record.record_id()), &data).await
    }

    async fn delete_record(&self, id: &str) -> StoreResult<bool> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_records(&self) -> StoreResult<Vec<T>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = hex::decode(stem)
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
                .ok_or_else(|| StoreError::Corrupted {
                    id: stem.to_string(),
                    reason: "file name is not a hex-encoded id".into(),
                })?;
            names.push((id, path));
        }
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for (id, path) in names {
            // A concurrent delete between read_dir and read is not an error.
            if let Some(record) = self.read_record(&id, &path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl KeyStore for JsonDirStore<Key> {
    async fn get(&self, kid: &str) -> StoreResult<Option<Key>> {
        self.get_record(kid).await
    }

    async fn put(&self, key: &Key) -> StoreResult<()> {
        self.put_record(key).await
    }

    async fn delete(&self, kid: &str) -> StoreResult<bool> {
        self.delete_record(kid).await
    }

    async fn list(&self, filter: &KeyFilter) -> StoreResult<Vec<Key>> {
        let mut keys = self.list_records().await?;
        keys.retain(|k| filter.matches(k));
        Ok(keys)
    }
}

#[async_trait]
impl PrivateKeyStore for JsonDirStore<PrivateKeyRecord> {
    async fn get(&self, kid: &str) -> StoreResult<Option<PrivateKeyRecord>> {
        self.get_record(kid).await
    }

    async fn put(&self, record: &PrivateKeyRecord) -> StoreResult<()> {
        self.put_record(record).await
    }

    async fn delete(&self, kid: &str) -> StoreResult<bool> {
        self.delete_record(kid).await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .list_records()
            .await?
            .into_iter()
            .map(|r| r.kid)
            .collect())
    }
}

#[async_trait]
impl DidStore for JsonDirStore<Identifier> {
    async fn get(&self, did: &str) -> StoreResult<Option<Identifier>> {
        self.get_record(did).await
    }

    async fn put(&self, identifier: &Identifier) -> StoreResult<()> {
        self.put_record(identifier).await
    }

    async fn delete(&self, did: &str) -> StoreResult<bool> {
        self.delete_record(did).await
    }

    async fn list(&self, filter: &IdentifierFilter) -> StoreResult<Vec<Identifier>> {
        let mut identifiers = self.list_records().await?;
        identifiers.retain(|i| filter.matches(i));
        Ok(identifiers)
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Write `data` to `path` through a uniquely named sibling temp file.
async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let tmp_path = path.with_extension(format!("json.{}.tmp", temp_suffix()));
    tokio::fs::write(&tmp_path, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}
