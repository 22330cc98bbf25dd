//! Assistant bootstrap

use crate::service::AssistantService;
use crate::tools::ToolRegistry;
use crate::types::{AssistantDefinition, AssistantTool};
use crate::Result;
use tracing::info;

/// Display name of the created assistant
pub const ASSISTANT_NAME: &str = "Data Analysis Assistant";

/// Standing instructions of the created assistant
pub const ASSISTANT_INSTRUCTIONS: &str = "\
You are a data analysis assistant. Your job is to help analyze datasets and answer questions about them.
When analyzing data:
1. First, explore and understand the dataset structure
2. Clean and preprocess the data as needed
3. Perform the requested analysis
4. Create visualizations when appropriate
5. Explain your findings in clear, non-technical language

Always be concise and focus on the most important insights.";

/// Definition used when no assistant can be reused
pub fn analysis_assistant(model: &str, tools: &ToolRegistry) -> AssistantDefinition {
    let mut assistant_tools = vec![AssistantTool::CodeInterpreter];
    assistant_tools.extend(
        tools
            .definitions()
            .into_iter()
            .map(|function| AssistantTool::Function { function }),
    );

    AssistantDefinition {
        name: ASSISTANT_NAME.to_string(),
        instructions: ASSISTANT_INSTRUCTIONS.to_string(),
        model: model.to_string(),
        tools: assistant_tools,
    }
}

/// Reuse `assistant_id` if the service knows it, otherwise create a new assistant
///
/// Any retrieval failure, not just "not found", falls through to creation.
pub async fn ensure_assistant(
    service: &dyn AssistantService,
    assistant_id: &str,
    model: &str,
    tools: &ToolRegistry,
) -> Result<String> {
    match service.retrieve_assistant(assistant_id).await {
        Ok(id) => {
            info!("Located assistant: {}", id);
            Ok(id)
        }
        Err(e) => {
            info!("Creating new assistant: {}", e);
            let id = service
                .create_assistant(&analysis_assistant(model, tools))
                .await?;
            info!("Created new assistant: {}", id);
            Ok(id)
        }
    }
}
