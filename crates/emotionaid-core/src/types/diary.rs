//! Diary entry type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CompanionError, CompanionResult};

/// A single diary note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub title: String,
    pub date: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl DiaryEntry {
    /// Create an entry dated now. Title and content must not be blank.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> CompanionResult<Self> {
        let entry = Self {
            title: title.into(),
            date: Utc::now(),
            content: content.into(),
            tags: Vec::new(),
            emoji: None,
        };
        entry.validate()?;
        Ok(entry)
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !tag.trim().is_empty() && !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    /// Check the invariants of an entry that may have been built field by field.
    pub fn validate(&self) -> CompanionResult<()> {
        if self.title.trim().is_empty() {
            return Err(CompanionError::InvalidInput("Title cannot be empty".into()));
        }
        if self.content.trim().is_empty() {
            return Err(CompanionError::InvalidInput("Content cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry() {
        let entry = DiaryEntry::new("Day 1", "ok").unwrap().with_tag("Quick").with_tag("Quick");
        assert_eq!(entry.tags, vec!["Quick"]);
        assert!(entry.emoji.is_none());
    }

    #[test]
    fn test_blank_fields_rejected() {
        assert!(DiaryEntry::new("", "ok").is_err());
        assert!(DiaryEntry::new("Day 1", " \n").is_err());
    }
}
