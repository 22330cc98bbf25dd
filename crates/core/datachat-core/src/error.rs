//! Error types for DataChat core

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::RunStatus;

/// Main error type for DataChat operations
#[derive(Debug, Error)]
pub enum DataChatError {
    /// The remote assistant service could not be reached or rejected the call
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// A run reached a terminal failure status
    #[error("Run {status}: {reason}")]
    RunFailed {
        /// Terminal status reported by the service
        status: RunStatus,
        /// Reason reported by the service, or a generic description
        reason: String,
    },

    /// A run did not reach a terminal status within the wall-clock bound
    #[error("Run timed out after {0:?}")]
    RunTimeout(Duration),

    /// A file id is unknown to the remote service or has expired
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The submitted turn cannot be sent
    #[error("Invalid turn: {0}")]
    InvalidTurn(String),

    /// The assistant asked for a tool that has no local handler
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The moderation endpoint flagged the user's text
    #[error("Message flagged by moderation: {0}")]
    Flagged(String),

    /// A turn is already outstanding on this session
    #[error("Session {0} is busy with an outstanding run")]
    SessionBusy(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type using DataChatError
pub type Result<T> = std::result::Result<T, DataChatError>;

/// Serializable marker attached to error transcript entries and API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network/auth failure reaching the service
    RemoteUnavailable,
    /// Run ended failed, cancelled or expired
    RunFailed,
    /// Run exceeded the wall-clock bound
    RunTimeout,
    /// Unknown or expired file id
    FileNotFound,
    /// Empty or malformed turn
    InvalidTurn,
    /// Tool name with no handler
    UnknownTool,
    /// Rejected by moderation
    Flagged,
    /// A run is outstanding on the session
    SessionBusy,
    /// Missing or malformed configuration
    Config,
    /// Anything else
    Internal,
}

impl DataChatError {
    /// Create a remote-unavailable error
    pub fn remote(msg: impl Into<String>) -> Self {
        DataChatError::RemoteUnavailable(msg.into())
    }

    /// Create a run-failed error
    pub fn run_failed(status: RunStatus, reason: Option<String>) -> Self {
        DataChatError::RunFailed {
            status,
            reason: reason.unwrap_or_else(|| "the assistant did not report a reason".to_string()),
        }
    }

    /// Create a not found error
    pub fn not_found(file_id: impl Into<String>) -> Self {
        DataChatError::FileNotFound(file_id.into())
    }

    /// Create an invalid-turn error
    pub fn invalid_turn(msg: impl Into<String>) -> Self {
        DataChatError::InvalidTurn(msg.into())
    }

    /// Create an unknown-tool error
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        DataChatError::UnknownTool(name.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        DataChatError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DataChatError::Validation(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        DataChatError::Other(msg.into())
    }

    /// Marker for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataChatError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            DataChatError::RunFailed { .. } => ErrorKind::RunFailed,
            DataChatError::RunTimeout(_) => ErrorKind::RunTimeout,
            DataChatError::FileNotFound(_) => ErrorKind::FileNotFound,
            DataChatError::InvalidTurn(_) => ErrorKind::InvalidTurn,
            DataChatError::UnknownTool(_) => ErrorKind::UnknownTool,
            DataChatError::Flagged(_) => ErrorKind::Flagged,
            DataChatError::SessionBusy(_) => ErrorKind::SessionBusy,
            DataChatError::Config(_) => ErrorKind::Config,
            DataChatError::Validation(_)
            | DataChatError::Serialization(_)
            | DataChatError::Io(_)
            | DataChatError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, DataChatError::RemoteUnavailable(_) | DataChatError::Io(_))
    }

    /// Text shown to the user when the error lands in the transcript
    pub fn user_message(&self) -> String {
        match self {
            DataChatError::RemoteUnavailable(_) => {
                "The assistant service could not be reached. Please try again.".to_string()
            }
            DataChatError::RunFailed { reason, .. } => {
                format!("Analysis failed: {reason}. Please try again.")
            }
            DataChatError::RunTimeout(after) => format!(
                "Analysis timed out after {}s. The assistant may still finish in the background.",
                after.as_secs()
            ),
            DataChatError::SessionBusy(_) => {
                "A previous question is still being analyzed. Please wait and try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DataChatError::remote("connection refused");
        assert_eq!(
            err.to_string(),
            "Remote service unavailable: connection refused"
        );
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);

        let err = DataChatError::not_found("file-1");
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_run_failed_default_reason() {
        let err = DataChatError::run_failed(RunStatus::Expired, None);
        assert_eq!(err.kind(), ErrorKind::RunFailed);
        assert!(err.to_string().starts_with("Run expired"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DataChatError::remote("503").is_transient());
        assert!(!DataChatError::not_found("file-1").is_transient());
        assert!(!DataChatError::RunTimeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn test_timeout_and_failure_messages_differ() {
        let timeout = DataChatError::RunTimeout(Duration::from_secs(30)).user_message();
        let failed =
            DataChatError::run_failed(RunStatus::Failed, Some("rate limited".into())).user_message();
        assert!(timeout.contains("timed out"));
        assert!(failed.contains("rate limited"));
        assert_ne!(timeout, failed);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::RunTimeout).unwrap();
        assert_eq!(json, "\"run_timeout\"");
    }
}
