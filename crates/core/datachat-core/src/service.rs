//! Remote assistant service interface
//!
//! Everything the orchestrator needs from the hosted assistant, expressed
//! over the core types. Providers implement this trait against a concrete
//! API; tests implement it with [`crate::testing::FakeAssistantService`].

use crate::types::{
    AssistantDefinition, NewFile, RemoteFile, RemoteMessage, Role, RunSnapshot, ToolOutput,
};
use crate::Result;
use async_trait::async_trait;

/// Hosted assistant API consumed by the orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Create an empty thread and return its id
    async fn create_thread(&self) -> Result<String>;

    /// Upload a file for use by the assistant
    async fn upload_file(&self, file: &NewFile) -> Result<RemoteFile>;

    /// Add a message to a thread, attaching files to the code interpreter, and return its id
    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        text: &str,
        file_ids: &[String],
    ) -> Result<String>;

    /// Start a run of an assistant on a thread
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunSnapshot>;

    /// Fetch the current state of a run
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot>;

    /// Hand tool outputs back to a run waiting on them
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot>;

    /// Ask the service to stop a run
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot>;

    /// Messages on a thread in creation order, strictly after `after` when given
    async fn list_messages(
        &self,
        thread_id: &str,
        after: Option<String>,
    ) -> Result<Vec<RemoteMessage>>;

    /// File metadata; `FileNotFound` for unknown ids
    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile>;

    /// File contents; `FileNotFound` for unknown ids
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Check that an assistant exists and return its id
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<String>;

    /// Create an assistant and return its id
    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<String>;

    /// Whether the moderation endpoint flags the text
    async fn moderate(&self, text: &str) -> Result<bool>;
}
