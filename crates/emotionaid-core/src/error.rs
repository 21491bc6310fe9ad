//! Error types for EmotionAid

use thiserror::Error;

/// Main error type for EmotionAid operations.
///
/// A value that is simply not stored locally is never an error: loaders
/// return `Ok(None)` for that case.
#[derive(Error, Debug)]
pub enum CompanionError {
    /// Stored data could not be decrypted or deserialized
    #[error("Corrupt local data for '{key}': {reason}")]
    CorruptData { key: String, reason: String },

    /// Disk or permission failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The OS-scoped data key is unavailable
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A value could not be serialized for storage or transport
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transient remote failure (connection, timeout, 5xx)
    #[error("Network error: {0}")]
    Network(String),

    /// The remote API refused the request (4xx, 429)
    #[error("Remote rejected request (status {status}): {body}")]
    RemoteRejected { status: u16, body: String },

    /// Database creation/opening error
    #[error("Database open error: {0}")]
    DatabaseOpen(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Caller supplied an invalid value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

impl CompanionError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::CorruptData {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Whether the error means local data is unreadable.
    ///
    /// Callers usually recover by treating the record as absent.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptData { .. })
    }
}

impl From<reqwest::Error> for CompanionError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.is_client_error() => Self::RemoteRejected {
                status: status.as_u16(),
                body: err.to_string(),
            },
            _ if err.is_decode() => Self::Serialization(err.to_string()),
            _ => Self::Network(err.to_string()),
        }
    }
}

/// Result type alias using CompanionError
pub type CompanionResult<T> = Result<T, CompanionError>;
