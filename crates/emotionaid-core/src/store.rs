//! Encrypted key-value store, one file per key.
//!
//! This module owns the on-disk representation of everything feature code
//! persists:
//! - Chat messages and dialog titles
//! - Diary pages, tags and triggers
//! - User profiles and the user id set
//! - Cache records (see [`crate::cache`])
//!
//! ```text
//! <data_dir>/store/
//! ├── chat_U1.dat
//! ├── diary_entries_U1_page1.dat
//! ├── cache_message_U1_%2B...dat
//! └── user_ids.dat
//! ```
//!
//! Values are serialized as JSON and sealed with the OS-scoped data key.
//! Keys too long for a filename are stored under a hashed name, with the
//! record wrapped as `{"key": ..., "value": ...}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CompanionError, CompanionResult};
use crate::keys::KeyProvider;

pub mod keyspace;
mod path;
mod sealed;

pub(crate) use sealed::SealedFiles;

use path::{is_hashed_stem, unescape_stem, RecordName, RECORD_EXTENSION};

/// Name of the store directory inside the data directory
pub const STORE_DIR: &str = "store";

/// Record layout for keys stored under a hashed name
#[derive(Serialize, Deserialize)]
struct KeyedRecord {
    key: String,
    value: Value,
}

/// Only the key of a [`KeyedRecord`], for listing
#[derive(Deserialize)]
struct KeyedRecordKey {
    key: String,
}

/// A record file found in the store directory
struct RecordFile {
    /// `None` for a hashed record whose key could not be read
    key: Option<String>,
    path: PathBuf,
}

struct KvInner {
    dir: PathBuf,
    files: SealedFiles,
    /// Serializes every operation on this store instance
    lock: Mutex<()>,
}

/// Encrypted key-value store.
///
/// Cloning is cheap and every clone shares the same lock, so a single
/// instance per data directory should be created and handed around.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<KvInner>,
}

impl KvStore {
    /// Open the store under `data_dir`, creating `data_dir/store` if needed.
    pub fn open(
        data_dir: impl AsRef<Path>,
        provider: Arc<dyn KeyProvider>,
    ) -> CompanionResult<Self> {
        let dir = data_dir.as_ref().join(STORE_DIR);
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened KV store");

        Ok(Self {
            inner: Arc::new(KvInner {
                dir,
                files: SealedFiles::new(provider),
                lock: Mutex::new(()),
            }),
        })
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn record_path(&self, key: &str) -> CompanionResult<(RecordName, PathBuf)> {
        if key.is_empty() {
            return Err(CompanionError::InvalidInput("storage key cannot be empty".into()));
        }
        let name = RecordName::for_key(key);
        let path = self
            .inner
            .dir
            .join(format!("{}.{}", name.stem(), RECORD_EXTENSION));
        Ok((name, path))
    }

    /// Save `value` under `key`, replacing any previous value.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CompanionResult<()> {
        let (name, path) = self.record_path(key)?;
        let json = if name.is_hashed() {
            serde_json::to_value(value).and_then(|value| {
                serde_json::to_vec(&KeyedRecord {
                    key: key.to_string(),
                    value,
                })
            })
        } else {
            serde_json::to_vec(value)
        }
        .map_err(|e| CompanionError::Serialization(e.to_string()))?;

        let _guard = self.inner.lock.lock().await;
        self.inner.files.write(&path, &json).await?;
        debug!(key, bytes = json.len(), "Saved record");
        Ok(())
    }

    /// Load the value stored under `key`.
    ///
    /// Returns `None` if nothing was saved. A record that cannot be decrypted
    /// or deserialized is reported as [`CompanionError::CorruptData`].
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> CompanionResult<Option<T>> {
        let (name, path) = self.record_path(key)?;

        let plaintext = {
            let _guard = self.inner.lock.lock().await;
            self.inner.files.read(&path, key).await
        };

        let plaintext = match plaintext {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => {
                if e.is_corrupt() {
                    warn!(key, error = %e, "Stored record is unreadable");
                }
                return Err(e);
            }
        };

        let parsed = if name.is_hashed() {
            match serde_json::from_slice::<KeyedRecord>(&plaintext) {
                Ok(record) if record.key == key => serde_json::from_value(record.value),
                Ok(record) => {
                    warn!(key, stored = %record.key, "Hashed record belongs to another key");
                    return Err(CompanionError::corrupt(key, "record holds a different key"));
                }
                Err(e) => Err(e),
            }
        } else {
            serde_json::from_slice(&plaintext)
        };

        parsed.map(Some).map_err(|e| {
            warn!(key, error = %e, "Stored record does not match the expected shape");
            CompanionError::corrupt(key, e)
        })
    }

    /// Check whether a record exists for `key`.
    pub async fn contains(&self, key: &str) -> CompanionResult<bool> {
        let (_, path) = self.record_path(key)?;
        let _guard = self.inner.lock.lock().await;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Delete the record for `key`.
    ///
    /// Returns `true` if a record was removed.
    pub async fn remove(&self, key: &str) -> CompanionResult<bool> {
        let (_, path) = self.record_path(key)?;
        let _guard = self.inner.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Removed record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List every stored key, sorted.
    pub async fn keys(&self) -> CompanionResult<Vec<String>> {
        let _guard = self.inner.lock.lock().await;
        let mut keys: Vec<String> = self
            .record_files()
            .await?
            .into_iter()
            .filter_map(|record| record.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Delete every record of this store.
    ///
    /// Only record files of the store directory are touched; anything else in
    /// the directory or outside it is left alone. Returns the number of
    /// records removed.
    pub async fn clear_all(&self) -> CompanionResult<usize> {
        let _guard = self.inner.lock.lock().await;
        let records = self.record_files().await?;
        let count = records.len();
        for record in records {
            match tokio::fs::remove_file(&record.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(count, dir = %self.inner.dir.display(), "Cleared KV store");
        Ok(count)
    }

    /// Record files currently on disk. Caller holds the lock.
    async fn record_files(&self) -> CompanionResult<Vec<RecordFile>> {
        let mut entries = match tokio::fs::read_dir(&self.inner.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_hashed_stem(stem) {
                let key = self.hashed_record_key(&path, stem).await;
                records.push(RecordFile { key, path });
            } else if let Some(key) = unescape_stem(stem) {
                records.push(RecordFile {
                    key: Some(key),
                    path,
                });
            }
        }
        Ok(records)
    }

    /// Key stored inside a hashed record, if it can be read.
    async fn hashed_record_key(&self, path: &Path, stem: &str) -> Option<String> {
        let plaintext = match self.inner.files.read(path, stem).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(file = stem, error = %e, "Cannot read key of hashed record");
                return None;
            }
        };
        match serde_json::from_slice::<KeyedRecordKey>(&plaintext) {
            Ok(record) => Some(record.key),
            Err(e) => {
                warn!(file = stem, error = %e, "Hashed record has no key");
                None
            }
        }
    }
}
