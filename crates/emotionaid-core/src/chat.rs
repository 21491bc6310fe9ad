//! Chat history persisted in the KV store.
//!
//! Each user's current dialog lives under `chat_<userId>`; titles of past
//! dialogs are kept in the shared `chat_history` list.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::CompanionResult;
use crate::store::{keyspace, KvStore};
use crate::types::Message;

/// Reads and appends chat messages.
#[derive(Clone)]
pub struct ChatRepository {
    store: KvStore,
    /// Held across read-modify-write sequences
    writes: Arc<Mutex<()>>,
}

impl ChatRepository {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Messages of the user's current dialog, oldest first.
    pub async fn messages(&self, user_id: &str) -> CompanionResult<Vec<Message>> {
        Ok(self
            .store
            .load(&keyspace::chat(user_id))
            .await?
            .unwrap_or_default())
    }

    /// Append `messages` to the user's current dialog.
    pub async fn append(&self, user_id: &str, messages: &[Message]) -> CompanionResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let _guard = self.writes.lock().await;
        let key = keyspace::chat(user_id);
        let mut history: Vec<Message> = self.store.load(&key).await?.unwrap_or_default();
        history.extend_from_slice(messages);
        self.store.save(&key, &history).await
    }

    /// Titles of past dialogs.
    pub async fn dialogs(&self) -> CompanionResult<Vec<String>> {
        Ok(self
            .store
            .load(keyspace::CHAT_HISTORY)
            .await?
            .unwrap_or_default())
    }

    /// Close the current dialog and start an empty one.
    ///
    /// Returns the title recorded for the new dialog.
    pub async fn start_new_dialog(&self, user_id: &str, now: DateTime<Utc>) -> CompanionResult<String> {
        let title = format!("Dialog {}", now.format("%Y-%m-%d %H:%M"));

        let _guard = self.writes.lock().await;
        let mut dialogs = self.dialogs().await?;
        dialogs.push(title.clone());
        self.store.save(keyspace::CHAT_HISTORY, &dialogs).await?;
        self.store
            .save(&keyspace::chat(user_id), &Vec::<Message>::new())
            .await?;

        info!(user_id, %title, "Started new dialog");
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeyProvider;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_repo() -> (ChatRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(temp_dir.path(), Arc::new(StaticKeyProvider::random())).unwrap();
        (ChatRepository::new(store), temp_dir)
    }

    #[tokio::test]
    async fn test_empty_history() {
        let (chats, _temp) = create_test_repo();
        assert!(chats.messages("U1").await.unwrap().is_empty());
        assert!(chats.dialogs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_keeps_order() {
        let (chats, _temp) = create_test_repo();

        chats
            .append("U1", &[Message::new("U1", "hi").unwrap()])
            .await
            .unwrap();
        chats
            .append("U1", &[Message::reply("hello").unwrap()])
            .await
            .unwrap();

        let texts: Vec<_> = chats
            .messages("U1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["hi", "hello"]);
        assert!(chats.messages("U2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_new_dialog() {
        let (chats, _temp) = create_test_repo();
        chats
            .append("U1", &[Message::new("U1", "old").unwrap()])
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 0).unwrap();
        let title = chats.start_new_dialog("U1", now).await.unwrap();

        assert_eq!(title, "Dialog 2026-03-14 09:26");
        assert_eq!(chats.dialogs().await.unwrap(), vec![title]);
        assert!(chats.messages("U1").await.unwrap().is_empty());
    }
}
