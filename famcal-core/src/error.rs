//! Error types for famcal.

use thiserror::Error;

/// Errors that can occur in famcal operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Calendar '{0}' has no feed to sync")]
    NotSyncable(String),

    #[error("Feed fetch error: {0}")]
    Fetch(String),

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Recurrence error: {0}")]
    Recurrence(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Result type alias for famcal operations.
pub type CoreResult<T> = Result<T, CoreError>;
