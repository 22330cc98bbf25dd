//! Remote run, message and file shapes as seen by the orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

use super::transcript::Role;
use crate::tools::FunctionDefinition;

/// Lifecycle status of a remote run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted, not yet started
    Queued,
    /// Executing
    InProgress,
    /// Waiting on local tool outputs
    RequiresAction,
    /// Cancellation requested
    Cancelling,
    /// Cancelled
    Cancelled,
    /// Failed
    Failed,
    /// Finished successfully
    Completed,
    /// Ended before producing a complete answer
    Incomplete,
    /// Not finished before the service's own deadline
    Expired,
    /// Status this client does not know; polled like an active run
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether polling should stop at this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in progress",
            RunStatus::RequiresAction => "requires action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Function call requested by the assistant mid-run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Id to answer with
    pub id: String,
    /// Function name
    pub name: String,
    /// Raw JSON arguments as sent by the service; may be empty
    pub arguments: String,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Run id
    pub id: String,
    /// Current status
    pub status: RunStatus,
    /// Tool calls awaiting outputs, populated when `status` is `RequiresAction`
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Failure reason reported by the service
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Answer to a single tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool call being answered
    pub tool_call_id: String,
    /// Output text handed back to the assistant
    pub output: String,
}

/// Content part of a message stored on the remote thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemotePart {
    /// Text, with ids of files referenced by its annotations
    Text {
        /// Text value
        text: String,
        /// Files cited by `file_path` annotations
        #[serde(default)]
        file_ids: Vec<String>,
    },
    /// Image produced by the code interpreter
    ImageFile {
        /// Image file id
        file_id: String,
    },
}

/// Message stored on the remote thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    /// Message id, usable as a listing cursor
    pub id: String,
    /// Author
    pub role: Role,
    /// Ordered content
    pub parts: Vec<RemotePart>,
    /// Ids of attached files
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Metadata of a remote file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// File id
    pub id: String,
    /// Original file name
    pub filename: String,
}

/// File received from the display layer, not yet uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    /// File name as uploaded by the user
    pub name: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl NewFile {
    /// Create a new file upload
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Tool enabled on the remote assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantTool {
    /// Hosted Python sandbox
    CodeInterpreter,
    /// Locally resolved function
    Function {
        /// Function schema
        function: FunctionDefinition,
    },
}

/// Everything needed to create the remote assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantDefinition {
    /// Display name
    pub name: String,
    /// System instructions
    pub instructions: String,
    /// Deployment/model name
    pub model: String,
    /// Enabled tools
    pub tools: Vec<AssistantTool>,
}
