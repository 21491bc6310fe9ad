//! Boundary to the remote companion API.
//!
//! Everything that talks HTTP lives under this module. The rest of the crate
//! only sees the [`RemoteGateway`] trait, which keeps the offline queue and
//! the companion testable without a server.

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CompanionResult;
use crate::types::{DiaryEntry, Message};

pub mod http;
pub mod retry;

pub use http::HttpGateway;
pub use retry::RetryPolicy;

/// Generation settings sent with each chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatParams {
    pub model: String,
    /// Language the reply should be written in
    pub language: String,
    /// System prompt; blank means none
    pub custom_prompt: String,
    pub temperature: f64,
    pub top_p: f64,
    /// Upper bound on reply tokens
    pub max_response_length: u32,
    /// Emotion detected in the user's message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_emotion: Option<String>,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            language: "en".to_string(),
            custom_prompt: "You are a helpful assistant.".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_response_length: 200,
            user_emotion: None,
        }
    }
}

/// Remote operations the client depends on.
///
/// Implementations report transient failures as
/// [`crate::CompanionError::Network`] and refusals as
/// [`crate::CompanionError::RemoteRejected`].
pub trait RemoteGateway: Send + Sync {
    /// Send a chat message and return the bot's reply.
    fn send_message(
        &self,
        user_id: &str,
        text: &str,
        history: &[Message],
        params: &ChatParams,
    ) -> impl Future<Output = CompanionResult<String>> + Send;

    /// Upload a recorded voice message and return the bot's reply.
    fn send_audio(
        &self,
        user_id: &str,
        file_path: &Path,
    ) -> impl Future<Output = CompanionResult<String>> + Send;

    /// Mirror a diary entry to the server.
    fn create_diary_entry(
        &self,
        user_id: &str,
        entry: &DiaryEntry,
    ) -> impl Future<Output = CompanionResult<()>> + Send;

    /// Whether the server is reachable.
    fn ping(&self) -> impl Future<Output = bool> + Send;
}
