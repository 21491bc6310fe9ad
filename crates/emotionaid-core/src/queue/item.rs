//! Queue items and their typed payloads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CompanionError, CompanionResult};
use crate::gateway::ChatParams;
use crate::types::{DiaryEntry, Message};

pub const SEND_MESSAGE: &str = "SendMessage";
pub const SEND_AUDIO: &str = "SendAudio";
pub const CREATE_DIARY_ENTRY: &str = "CreateDiaryEntry";

/// One pending remote operation as persisted in the queue file.
///
/// `data` stays untyped on disk so that items written by a newer client
/// with an unknown `action` can still be read and skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub action: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub attempts: u32,
}

impl QueueItem {
    /// Decode the payload.
    ///
    /// Returns `Ok(None)` for an action this client does not know.
    pub fn decode(&self) -> Result<Option<QueuedAction>, serde_json::Error> {
        QueuedAction::decode(&self.action, &self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub user_id: String,
    #[serde(alias = "message")]
    pub text: String,
    /// Conversation so far, sent as context
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub params: ChatParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAudioPayload {
    pub user_id: String,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiaryEntryPayload {
    pub user_id: String,
    pub entry: DiaryEntry,
}

/// A remote operation waiting for connectivity.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedAction {
    SendMessage(SendMessagePayload),
    SendAudio(SendAudioPayload),
    CreateDiaryEntry(CreateDiaryEntryPayload),
}

impl QueuedAction {
    /// Tag written to the `action` field.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => SEND_MESSAGE,
            Self::SendAudio(_) => SEND_AUDIO,
            Self::CreateDiaryEntry(_) => CREATE_DIARY_ENTRY,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::SendMessage(p) => &p.user_id,
            Self::SendAudio(p) => &p.user_id,
            Self::CreateDiaryEntry(p) => &p.user_id,
        }
    }

    pub(crate) fn to_data(&self) -> CompanionResult<Value> {
        let value = match self {
            Self::SendMessage(p) => serde_json::to_value(p),
            Self::SendAudio(p) => serde_json::to_value(p),
            Self::CreateDiaryEntry(p) => serde_json::to_value(p),
        };
        value.map_err(|e| CompanionError::Serialization(e.to_string()))
    }

    pub fn decode(action: &str, data: &Value) -> Result<Option<Self>, serde_json::Error> {
        let decoded = match action {
            SEND_MESSAGE => Self::SendMessage(SendMessagePayload::deserialize(data)?),
            SEND_AUDIO => Self::SendAudio(SendAudioPayload::deserialize(data)?),
            CREATE_DIARY_ENTRY => Self::CreateDiaryEntry(CreateDiaryEntryPayload::deserialize(data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    /// Reject payloads that could never be delivered.
    pub fn validate(&self) -> CompanionResult<()> {
        if self.user_id().trim().is_empty() {
            return Err(CompanionError::InvalidInput("user id cannot be empty".into()));
        }
        match self {
            Self::SendMessage(p) if p.text.trim().is_empty() => Err(CompanionError::InvalidInput(
                "message text cannot be empty".into(),
            )),
            Self::SendAudio(p) if p.file_path.as_os_str().is_empty() => Err(
                CompanionError::InvalidInput("audio file path cannot be empty".into()),
            ),
            Self::CreateDiaryEntry(p) => p.entry.validate(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_send_message_payload() {
        let action = QueuedAction::decode(SEND_MESSAGE, &json!({"userId": "U1", "text": "hi"}))
            .unwrap()
            .unwrap();
        let QueuedAction::SendMessage(payload) = action else {
            panic!("expected SendMessage");
        };
        assert_eq!(payload.user_id, "U1");
        assert_eq!(payload.text, "hi");
        assert!(payload.history.is_empty());
        assert_eq!(payload.params, ChatParams::default());
    }

    #[test]
    fn test_legacy_message_field() {
        let action = QueuedAction::decode(SEND_MESSAGE, &json!({"userId": "U1", "message": "hey"}))
            .unwrap()
            .unwrap();
        assert!(matches!(action, QueuedAction::SendMessage(p) if p.text == "hey"));
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert!(QueuedAction::decode("Teleport", &json!({})).unwrap().is_none());
        assert!(QueuedAction::decode(SEND_AUDIO, &json!({"userId": 5})).is_err());
    }

    #[test]
    fn test_validate() {
        let blank = QueuedAction::SendMessage(SendMessagePayload {
            user_id: "U1".into(),
            text: "  ".into(),
            history: Vec::new(),
            params: ChatParams::default(),
        });
        assert!(blank.validate().is_err());

        let no_user = QueuedAction::SendAudio(SendAudioPayload {
            user_id: String::new(),
            file_path: "voice.wav".into(),
        });
        assert!(no_user.validate().is_err());
    }

    #[test]
    fn test_data_uses_camel_case() {
        let action = QueuedAction::SendAudio(SendAudioPayload {
            user_id: "U1".into(),
            file_path: "voice.wav".into(),
        });
        let data = action.to_data().unwrap();
        assert_eq!(data, json!({"userId": "U1", "filePath": "voice.wav"}));
        assert_eq!(QueuedAction::decode(action.tag(), &data).unwrap(), Some(action));
    }
}
