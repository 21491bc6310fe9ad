//! Sealed file I/O shared by the KV store and the offline queue.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::crypto::DataCipher;
use crate::error::{CompanionError, CompanionResult};
use crate::keys::KeyProvider;

/// Reads and writes files encrypted with the OS-scoped data key.
///
/// The key is resolved on first use, so a missing credential store surfaces
/// as an [`CompanionError::Encryption`] from the first read or write rather
/// than at construction.
pub(crate) struct SealedFiles {
    provider: Arc<dyn KeyProvider>,
    cipher: OnceCell<DataCipher>,
}

impl SealedFiles {
    pub(crate) fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            provider,
            cipher: OnceCell::new(),
        }
    }

    async fn cipher(&self) -> CompanionResult<&DataCipher> {
        self.cipher
            .get_or_try_init(|| async {
                let provider = self.provider.clone();
                // Credential store calls block
                let key = tokio::task::spawn_blocking(move || provider.data_key())
                    .await
                    .map_err(|e| CompanionError::Encryption(format!("key lookup aborted: {}", e)))??;
                Ok::<_, CompanionError>(DataCipher::new(&key))
            })
            .await
    }

    /// Read and decrypt `path`. A missing file is `Ok(None)`.
    pub(crate) async fn read(&self, path: &Path, label: &str) -> CompanionResult<Option<Vec<u8>>> {
        let sealed = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let cipher = self.cipher().await?;
        cipher.open(label, &sealed).map(Some)
    }

    /// Encrypt `plaintext` and replace `path` atomically.
    ///
    /// The sealed bytes are written to a `.tmp` sibling first and renamed over
    /// the target, so readers never observe a partial file.
    pub(crate) async fn write(&self, path: &Path, plaintext: &[u8]) -> CompanionResult<()> {
        let cipher = self.cipher().await?;
        let sealed = cipher.seal(plaintext)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &sealed).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}
