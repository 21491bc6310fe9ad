//! Chat message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CompanionError, CompanionResult};

/// Author name used for replies from the remote model
pub const BOT_AUTHOR: &str = "Bot";

/// Delivery state of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageStatus {
    #[default]
    None,
    Sending,
    Sent,
    Delivered,
    Read,
    Error,
}

/// One chat message as stored in a user's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// User id for the user's own messages, [`BOT_AUTHOR`] for replies
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// Create a message stamped with the current time.
    ///
    /// Author and text must not be blank.
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> CompanionResult<Self> {
        let author = author.into();
        let text = text.into();
        if author.trim().is_empty() {
            return Err(CompanionError::InvalidInput("Author cannot be empty".into()));
        }
        if text.trim().is_empty() {
            return Err(CompanionError::InvalidInput("Text cannot be empty".into()));
        }
        Ok(Self {
            author,
            text,
            timestamp: Utc::now(),
            status: MessageStatus::None,
        })
    }

    /// A reply from the remote model.
    pub fn reply(text: impl Into<String>) -> CompanionResult<Self> {
        Self::new(BOT_AUTHOR, text).map(|m| m.with_status(MessageStatus::Sent))
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_from_bot(&self) -> bool {
        self.author == BOT_AUTHOR
    }
}
