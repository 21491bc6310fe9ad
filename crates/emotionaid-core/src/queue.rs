//! Durable FIFO of remote operations waiting for connectivity.
//!
//! The queue lives in its own sealed file, `<data_dir>/offline_queue.dat`,
//! as an ordered JSON list of [`QueueItem`]s. Items are replayed by
//! [`OfflineQueue::drain_and_sync`] once the server is reachable again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

use crate::error::{CompanionError, CompanionResult};
use crate::keys::KeyProvider;
use crate::store::SealedFiles;

mod drain;
pub mod item;

pub use drain::DrainReport;
pub use item::{
    CreateDiaryEntryPayload, QueueItem, QueuedAction, SendAudioPayload, SendMessagePayload,
};

/// Name of the queue file inside the data directory
pub const QUEUE_FILE: &str = "offline_queue.dat";

/// Failed deliveries after which an item is dropped
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

struct QueueInner {
    path: PathBuf,
    files: SealedFiles,
    /// Guards every read-modify-write of the queue file
    lock: Mutex<()>,
    /// Held for the whole of a drain so two drains never overlap
    draining: Mutex<()>,
    max_attempts: u32,
}

/// The offline action queue.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<QueueInner>,
}

impl OfflineQueue {
    pub fn open(
        data_dir: impl AsRef<Path>,
        provider: Arc<dyn KeyProvider>,
        max_attempts: u32,
    ) -> CompanionResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(QUEUE_FILE);
        debug!(path = %path.display(), "Opened offline queue");

        Ok(Self {
            inner: Arc::new(QueueInner {
                path,
                files: SealedFiles::new(provider),
                lock: Mutex::new(()),
                draining: Mutex::new(()),
                max_attempts: max_attempts.max(1),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.max_attempts
    }

    /// Append a typed action. The payload is validated first.
    pub async fn enqueue(&self, action: QueuedAction) -> CompanionResult<QueueItem> {
        action.validate()?;
        self.push(action.tag().to_string(), action.to_data()?).await
    }

    /// Append an action given by tag and raw payload.
    ///
    /// Known tags are decoded and validated like [`enqueue`](Self::enqueue).
    /// Unknown tags are stored as-is and dropped by the next drain.
    pub async fn enqueue_raw(&self, action: &str, data: Value) -> CompanionResult<QueueItem> {
        match QueuedAction::decode(action, &data) {
            Ok(Some(decoded)) => decoded.validate()?,
            Ok(None) => {}
            Err(e) => {
                return Err(CompanionError::InvalidInput(format!(
                    "malformed {} payload: {}",
                    action, e
                )))
            }
        }
        self.push(action.to_string(), data).await
    }

    async fn push(&self, action: String, data: Value) -> CompanionResult<QueueItem> {
        let item = QueueItem {
            id: Ulid::new().to_string(),
            action,
            data,
            timestamp: Utc::now(),
            attempts: 0,
        };

        let _guard = self.inner.lock.lock().await;
        let mut items = self.load_items().await?;
        items.push(item.clone());
        self.save_items(&items).await?;

        info!(action = %item.action, id = %item.id, pending = items.len(), "Queued offline action");
        Ok(item)
    }

    /// Items waiting to be sent, oldest first.
    pub async fn pending(&self) -> CompanionResult<Vec<QueueItem>> {
        let _guard = self.inner.lock.lock().await;
        self.load_items().await
    }

    pub async fn len(&self) -> CompanionResult<usize> {
        Ok(self.pending().await?.len())
    }

    pub async fn is_empty(&self) -> CompanionResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drop every pending item. Returns how many were removed.
    pub async fn clear(&self) -> CompanionResult<usize> {
        let _guard = self.inner.lock.lock().await;
        let count = self.load_items().await?.len();
        match tokio::fs::remove_file(&self.inner.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(count, "Cleared offline queue");
        Ok(count)
    }

    /// Caller holds `lock`.
    async fn load_items(&self) -> CompanionResult<Vec<QueueItem>> {
        let Some(bytes) = self.inner.files.read(&self.inner.path, QUEUE_FILE).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_slice(&bytes).map_err(|e| CompanionError::corrupt(QUEUE_FILE, e))
    }

    /// Caller holds `lock`.
    async fn save_items(&self, items: &[QueueItem]) -> CompanionResult<()> {
        let json =
            serde_json::to_vec(items).map_err(|e| CompanionError::Serialization(e.to_string()))?;
        self.inner.files.write(&self.inner.path, &json).await
    }
}
