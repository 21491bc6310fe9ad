//! User profile type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{CompanionError, CompanionResult};

/// A local user of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create a profile with a fresh ULID id.
    pub fn new(name: impl Into<String>) -> CompanionResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CompanionError::InvalidInput("Name cannot be empty".into()));
        }
        Ok(Self {
            id: Ulid::new().to_string(),
            name,
            created_at: Utc::now(),
        })
    }
}
