//! JSON shapes of the Assistants REST API and their mapping onto core types

use datachat_core::types::{
    RemoteFile, RemoteMessage, RemotePart, Role, RunSnapshot, RunStatus,
    ToolCall, ToolOutput,
};
use serde::{Deserialize, Serialize};

/// Any object we only need the id of
#[derive(Debug, Deserialize)]
pub(crate) struct ObjectId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFile {
    pub id: String,
    #[serde(default)]
    pub filename: String,
}

impl From<WireFile> for RemoteFile {
    fn from(file: WireFile) -> Self {
        let filename = if file.filename.is_empty() {
            file.id.clone()
        } else {
            file.filename
        };
        RemoteFile {
            id: file.id,
            filename,
        }
    }
}

// Runs

#[derive(Debug, Deserialize)]
pub(crate) struct WireRun {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RequiredAction {
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputsAction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitToolOutputsAction {
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireToolCall {
    pub id: String,
    pub function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LastError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<WireRun> for RunSnapshot {
    fn from(run: WireRun) -> Self {
        let tool_calls = run
            .required_action
            .and_then(|a| a.submit_tool_outputs)
            .map(|s| {
                s.tool_calls
                    .into_iter()
                    .map(|c| ToolCall {
                        id: c.id,
                        name: c.function.name,
                        arguments: c.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let last_error = match (run.last_error, run.incomplete_details) {
            (Some(e), _) => Some(match e.code {
                Some(code) if !e.message.is_empty() => format!("{} ({})", e.message, code),
                Some(code) => code,
                None => e.message,
            }),
            (None, Some(d)) => d.reason,
            (None, None) => None,
        };

        RunSnapshot {
            id: run.id,
            status: run.status,
            tool_calls,
            last_error,
        }
    }
}

// Messages

#[derive(Debug, Deserialize)]
pub(crate) struct MessageList {
    pub data: Vec<WireMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<WireContent>,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireContent {
    Text { text: WireText },
    ImageFile { image_file: FileIdRef },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireText {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireAnnotation {
    FilePath { file_path: FileIdRef },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileIdRef {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAttachment {
    pub file_id: String,
}

impl From<WireMessage> for RemoteMessage {
    fn from(message: WireMessage) -> Self {
        let parts = message
            .content
            .into_iter()
            .filter_map(|c| match c {
                WireContent::Text { text } => Some(RemotePart::Text {
                    file_ids: text
                        .annotations
                        .into_iter()
                        .filter_map(|a| match a {
                            WireAnnotation::FilePath { file_path } => Some(file_path.file_id),
                            WireAnnotation::Other => None,
                        })
                        .collect(),
                    text: text.value,
                }),
                WireContent::ImageFile { image_file } => Some(RemotePart::ImageFile {
                    file_id: image_file.file_id,
                }),
                WireContent::Unsupported => None,
            })
            .collect();

        RemoteMessage {
            id: message.id,
            role: message.role,
            parts,
            attachments: message.attachments.into_iter().map(|a| a.file_id).collect(),
        }
    }
}

// Requests

#[derive(Debug, Serialize)]
pub(crate) struct CreateMessageRequest<'a> {
    pub role: Role,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRequest<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttachmentRequest<'a> {
    pub file_id: &'a str,
    pub tools: Vec<serde_json::Value>,
}

impl<'a> AttachmentRequest<'a> {
    pub fn code_interpreter(file_id: &'a str) -> Self {
        Self {
            file_id,
            tools: vec![serde_json::json!({"type": "code_interpreter"})],
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitToolOutputsRequest<'a> {
    pub tool_outputs: &'a [ToolOutput],
}

#[derive(Debug, Serialize)]
pub(crate) struct ModerationRequest<'a> {
    pub input: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModerationResponse {
    #[serde(default)]
    pub results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModerationResult {
    #[serde(default)]
    pub flagged: bool,
}
