//! Locally resolved function tools
//!
//! The assistant may pause a run and ask the caller to execute a named
//! function. Every function it can ask for is a variant of [`LocalTool`];
//! names that do not map to a variant resolve to
//! [`DataChatError::UnknownTool`] and are answered with an error payload.

use crate::types::{ToolCall, ToolOutput, UploadedFile};
use crate::{DataChatError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Function definition advertised to the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,

    /// Function description
    pub description: String,

    /// Parameters schema (JSON Schema)
    pub parameters: serde_json::Value,
}

/// Data tool handlers may read
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    /// Files uploaded in the current session
    pub uploaded_files: &'a [UploadedFile],
}

/// Closed set of functions the assistant can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalTool {
    /// Acknowledge an analysis question about a dataset
    AnalyzeData,
}

#[derive(Debug, Deserialize)]
struct AnalyzeDataArgs {
    dataset_name: String,
    question: String,
}

impl LocalTool {
    /// Every tool, in advertisement order
    pub const ALL: &'static [LocalTool] = &[LocalTool::AnalyzeData];

    /// Wire name
    pub fn name(self) -> &'static str {
        match self {
            LocalTool::AnalyzeData => "analyze_data",
        }
    }

    /// Find the tool for a wire name
    pub fn lookup(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| DataChatError::unknown_tool(name))
    }

    /// Schema sent when creating the assistant
    pub fn definition(self) -> FunctionDefinition {
        match self {
            LocalTool::AnalyzeData => FunctionDefinition {
                name: self.name().to_string(),
                description: "Analyze a dataset based on a specific question".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "dataset_name": {"type": "string"},
                        "question": {"type": "string"}
                    },
                    "required": ["dataset_name", "question"]
                }),
            },
        }
    }

    fn invoke(self, arguments: serde_json::Value, ctx: &ToolContext<'_>) -> Result<String> {
        match self {
            LocalTool::AnalyzeData => {
                let args: AnalyzeDataArgs = serde_json::from_value(arguments).map_err(|e| {
                    DataChatError::validation(format!("invalid analyze_data arguments: {e}"))
                })?;
                let known = ctx
                    .uploaded_files
                    .iter()
                    .any(|f| f.name.eq_ignore_ascii_case(&args.dataset_name));
                if known {
                    Ok(format!(
                        "Analysis of {} complete. The answer to '{}' is in the generated visualizations and data.",
                        args.dataset_name, args.question
                    ))
                } else {
                    Ok(format!(
                        "Dataset '{}' is not among the uploaded files. Answer '{}' using the files attached to the thread.",
                        args.dataset_name, args.question
                    ))
                }
            }
        }
    }
}

/// Tools enabled for a deployment
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<LocalTool>,
}

impl ToolRegistry {
    /// Registry with the given tools enabled
    pub fn new(tools: impl IntoIterator<Item = LocalTool>) -> Self {
        Self {
            tools: tools.into_iter().collect(),
        }
    }

    /// Registry with nothing enabled
    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    /// Definitions of every enabled tool
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Check if a tool is enabled
    pub fn has_function(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Get number of enabled tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn lookup(&self, name: &str) -> Result<LocalTool> {
        let tool = LocalTool::lookup(name)?;
        if self.tools.contains(&tool) {
            Ok(tool)
        } else {
            Err(DataChatError::unknown_tool(name))
        }
    }

    /// Execute one call; failures become an error payload rather than an `Err`
    pub fn resolve(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> ToolOutput {
        info!("Executing function: {}", call.name);
        debug!("Function arguments: {}", call.arguments);

        let outcome = self.lookup(&call.name).and_then(|tool| {
            let arguments = if call.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&call.arguments)?
            };
            tool.invoke(arguments, ctx)
        });

        let output = match outcome {
            Ok(output) => output,
            Err(e @ DataChatError::UnknownTool(_)) => {
                error!("Unrecognized function name: {}. Tool call: {}", call.name, call.id);
                error_payload(&e, "Function name is not recognized. Please check your request structure.")
            }
            Err(e) => {
                warn!("Function {} failed: {}", call.name, e);
                error_payload(&e, &e.to_string())
            }
        };

        ToolOutput {
            tool_call_id: call.id.clone(),
            output,
        }
    }

    /// Execute every call in order
    pub fn resolve_all(&self, calls: &[ToolCall], ctx: &ToolContext<'_>) -> Vec<ToolOutput> {
        calls.iter().map(|call| self.resolve(call, ctx)).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(LocalTool::ALL.iter().copied())
    }
}

fn error_payload(err: &DataChatError, message: &str) -> String {
    serde_json::json!({
        "status": "error",
        "kind": err.kind(),
        "message": message,
    })
    .to_string()
}
