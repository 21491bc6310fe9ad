//! Local user profiles and their avatars.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{CompanionError, CompanionResult};
use crate::store::{keyspace, KvStore};
use crate::types::UserProfile;

/// A profile picture, sealed in the store like every other record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    /// Extension of the source file without the dot, empty if it had none
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl Avatar {
    /// File name used when the avatar is written out: `avatar_<id>.<ext>`.
    pub fn file_name(&self, user_id: &str) -> String {
        if self.extension.is_empty() {
            format!("avatar_{}", user_id)
        } else {
            format!("avatar_{}.{}", user_id, self.extension)
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredAvatar {
    extension: String,
    /// Base64 of the image bytes
    data: String,
}

/// Known users of this installation.
///
/// Ids are appended to the `user_ids` set and are only removed by a full
/// data wipe.
#[derive(Clone)]
pub struct ProfileDirectory {
    store: KvStore,
    writes: Arc<Mutex<()>>,
}

impl ProfileDirectory {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub async fn user_ids(&self) -> CompanionResult<Vec<String>> {
        Ok(self
            .store
            .load(keyspace::USER_IDS)
            .await?
            .unwrap_or_default())
    }

    /// Create and persist a profile with a fresh id.
    pub async fn create_profile(&self, name: &str) -> CompanionResult<UserProfile> {
        let profile = UserProfile::new(name.trim())?;

        let _guard = self.writes.lock().await;
        self.store
            .save(&keyspace::profile(&profile.id), &profile)
            .await?;
        let mut ids = self.user_ids().await?;
        if !ids.contains(&profile.id) {
            ids.push(profile.id.clone());
            self.store.save(keyspace::USER_IDS, &ids).await?;
        }

        info!(user_id = %profile.id, name = %profile.name, "Created profile");
        Ok(profile)
    }

    pub async fn profile(&self, user_id: &str) -> CompanionResult<Option<UserProfile>> {
        self.store.load(&keyspace::profile(user_id)).await
    }

    /// Copy the image at `path` into the store as the avatar of `user_id`.
    ///
    /// Replaces any previous avatar. The file must exist.
    pub async fn save_avatar(&self, user_id: &str, path: &Path) -> CompanionResult<Avatar> {
        if user_id.trim().is_empty() {
            return Err(CompanionError::InvalidInput("user id cannot be empty".into()));
        }
        if !tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
            return Err(CompanionError::InvalidInput(format!(
                "invalid avatar file path: {}",
                path.display()
            )));
        }

        let avatar = Avatar {
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string(),
            bytes: tokio::fs::read(path).await?,
        };
        let stored = StoredAvatar {
            extension: avatar.extension.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(&avatar.bytes),
        };
        self.store.save(&keyspace::avatar(user_id), &stored).await?;

        info!(user_id, bytes = avatar.bytes.len(), "Saved avatar");
        Ok(avatar)
    }

    pub async fn avatar(&self, user_id: &str) -> CompanionResult<Option<Avatar>> {
        let key = keyspace::avatar(user_id);
        let Some(stored) = self.store.load::<StoredAvatar>(&key).await? else {
            return Ok(None);
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&stored.data)
            .map_err(|e| CompanionError::corrupt(key, e))?;
        Ok(Some(Avatar {
            extension: stored.extension,
            bytes,
        }))
    }

    /// Write the avatar of `user_id` into `dir` as plain image bytes.
    ///
    /// Returns the written path, or `None` when the user has no avatar.
    pub async fn export_avatar(&self, user_id: &str, dir: &Path) -> CompanionResult<Option<PathBuf>> {
        let Some(avatar) = self.avatar(user_id).await? else {
            return Ok(None);
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(avatar.file_name(user_id));
        tokio::fs::write(&path, &avatar.bytes).await?;
        info!(user_id, path = %path.display(), "Exported avatar");
        Ok(Some(path))
    }

    /// The first profile ever created, if any.
    pub async fn primary_user(&self) -> CompanionResult<Option<String>> {
        Ok(self.user_ids().await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeyProvider;
    use tempfile::TempDir;

    fn create_test_directory() -> (ProfileDirectory, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(temp_dir.path(), Arc::new(StaticKeyProvider::random())).unwrap();
        (ProfileDirectory::new(store), temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (profiles, _temp) = create_test_directory();
        assert!(profiles.primary_user().await.unwrap().is_none());

        let first = profiles.create_profile("Love").await.unwrap();
        let second = profiles.create_profile(" Sam ").await.unwrap();

        assert_eq!(second.name, "Sam");
        assert_eq!(
            profiles.user_ids().await.unwrap(),
            vec![first.id.clone(), second.id.clone()]
        );
        assert_eq!(profiles.primary_user().await.unwrap(), Some(first.id.clone()));
        assert_eq!(profiles.profile(&first.id).await.unwrap(), Some(first));
        assert!(profiles.profile("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_avatar_roundtrip() {
        let (profiles, temp) = create_test_directory();
        let source = temp.path().join("me.png");
        std::fs::write(&source, [0x89, b'P', b'N', b'G', 0, 1, 2]).unwrap();

        assert!(profiles.avatar("U1").await.unwrap().is_none());
        let saved = profiles.save_avatar("U1", &source).await.unwrap();
        assert_eq!(saved.extension, "png");

        // The stored copy survives the source going away
        std::fs::remove_file(&source).unwrap();
        assert_eq!(profiles.avatar("U1").await.unwrap(), Some(saved.clone()));

        let out = temp.path().join("out");
        let exported = profiles.export_avatar("U1", &out).await.unwrap().unwrap();
        assert_eq!(exported, out.join("avatar_U1.png"));
        assert_eq!(std::fs::read(&exported).unwrap(), saved.bytes);
        assert!(profiles.export_avatar("U2", &out).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_avatar_is_sealed() {
        let (profiles, temp) = create_test_directory();
        let source = temp.path().join("face");
        std::fs::write(&source, b"plain image bytes").unwrap();

        let saved = profiles.save_avatar("U1", &source).await.unwrap();
        assert_eq!(saved.file_name("U1"), "avatar_U1");

        let raw = std::fs::read(profiles.store.dir().join("avatar_U1.dat")).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("plain image bytes"));
    }

    #[tokio::test]
    async fn test_avatar_requires_existing_file() {
        let (profiles, temp) = create_test_directory();

        let missing = profiles.save_avatar("U1", &temp.path().join("nope.png")).await;
        assert!(matches!(missing, Err(CompanionError::InvalidInput(_))));

        let directory = profiles.save_avatar("U1", temp.path()).await;
        assert!(matches!(directory, Err(CompanionError::InvalidInput(_))));

        std::fs::write(temp.path().join("a.png"), b"x").unwrap();
        let blank_user = profiles.save_avatar(" ", &temp.path().join("a.png")).await;
        assert!(matches!(blank_user, Err(CompanionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (profiles, _temp) = create_test_directory();
        assert!(profiles.create_profile("  ").await.is_err());
        assert!(profiles.user_ids().await.unwrap().is_empty());
    }
}
