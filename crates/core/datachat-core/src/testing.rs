//! Testing utilities: a scripted in-memory assistant service and a manual clock

use crate::clock::Clock;
use crate::service::AssistantService;
use crate::types::{
    AssistantDefinition, NewFile, RemoteFile, RemoteMessage, RemotePart, Role, RunSnapshot,
    RunStatus, ToolCall, ToolOutput,
};
use crate::{DataChatError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One status report of a scripted run
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Plain status with nothing attached
    Status(RunStatus),
    /// `requires_action` with the given tool calls
    RequiresAction(Vec<ToolCall>),
    /// `failed` with a reason
    Failed(String),
}

impl ScriptStep {
    fn snapshot(&self, run_id: &str) -> RunSnapshot {
        let (status, tool_calls, last_error) = match self {
            ScriptStep::Status(status) => (*status, Vec::new(), None),
            ScriptStep::RequiresAction(calls) => (RunStatus::RequiresAction, calls.clone(), None),
            ScriptStep::Failed(reason) => (RunStatus::Failed, Vec::new(), Some(reason.clone())),
        };
        RunSnapshot {
            id: run_id.to_string(),
            status,
            tool_calls,
            last_error,
        }
    }
}

#[derive(Default)]
struct FakeState {
    script: Vec<ScriptStep>,
    position: usize,
    replies: Vec<(Vec<RemotePart>, Vec<String>)>,
    threads: HashMap<String, Vec<RemoteMessage>>,
    files: HashMap<String, (String, Vec<u8>)>,
    assistants: HashSet<String>,
    failing: HashMap<String, usize>,
    delays: HashMap<String, Duration>,
    flagged: bool,
    calls: Vec<String>,
    submitted: Vec<ToolOutput>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn record(&mut self, op: &str) -> Result<()> {
        self.calls.push(op.to_string());
        if let Some(&allowed) = self.failing.get(op) {
            let made = self.calls.iter().filter(|c| *c == op).count();
            if made > allowed {
                return Err(DataChatError::remote(format!("{op} failed (injected)")));
            }
        }
        Ok(())
    }

    fn current_step(&self) -> ScriptStep {
        self.script
            .get(self.position.min(self.script.len().saturating_sub(1)))
            .cloned()
            .unwrap_or(ScriptStep::Status(RunStatus::Completed))
    }
}

/// In-memory [`AssistantService`] driven by a run script
///
/// `create_run` reports the first step and each `get_run` advances one
/// step; the last step repeats forever. Reply messages are appended to the
/// thread when a run is created.
#[derive(Default)]
pub struct FakeAssistantService {
    state: Mutex<FakeState>,
}

impl FakeAssistantService {
    /// Service whose runs complete immediately with no reply
    pub fn new() -> Self {
        Self::default()
    }

    /// Status sequence reported for every run
    pub fn with_script(self, steps: Vec<ScriptStep>) -> Self {
        self.set_script(steps);
        self
    }

    /// Swap the script mid-test; runs already started continue on it
    pub fn set_script(&self, steps: Vec<ScriptStep>) {
        let mut state = self.state();
        state.script = steps;
        state.position = 0;
    }

    /// Append an assistant text reply for the next run
    pub fn with_reply_text(self, text: impl Into<String>) -> Self {
        self.with_reply(
            vec![RemotePart::Text {
                text: text.into(),
                file_ids: Vec::new(),
            }],
            Vec::new(),
        )
    }

    /// Append an assistant reply with arbitrary parts and attachments
    pub fn with_reply(self, parts: Vec<RemotePart>, attachments: Vec<String>) -> Self {
        {
            let mut state = self.state();
            state.replies.push((parts, attachments));
        }
        self
    }

    /// Store a file the assistant "generated"
    pub fn with_file(self, id: &str, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        {
            let mut state = self.state();
            state
                .files
                .insert(id.to_string(), (name.to_string(), bytes.into()));
        }
        self
    }

    /// Register an existing assistant id
    pub fn with_assistant(self, id: &str) -> Self {
        {
            let mut state = self.state();
            state.assistants.insert(id.to_string());
        }
        self
    }

    /// Make every call to `op` fail with `RemoteUnavailable`
    pub fn fail_on(self, op: &str) -> Self {
        self.fail_after(op, 0)
    }

    /// Let `op` succeed `successes` times, then fail every later call
    pub fn fail_after(self, op: &str, successes: usize) -> Self {
        {
            let mut state = self.state();
            state.failing.insert(op.to_string(), successes);
        }
        self
    }

    /// Hold every call to `op` for `delay` of tokio time before answering
    pub fn with_delay(self, op: &str, delay: Duration) -> Self {
        {
            let mut state = self.state();
            state.delays.insert(op.to_string(), delay);
        }
        self
    }

    /// Flag every moderated text
    pub fn flag_everything(self) -> Self {
        {
            let mut state = self.state();
            state.flagged = true;
        }
        self
    }

    /// Operations invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of times `op` was invoked
    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == op).count()
    }

    /// Every tool output submitted so far
    pub fn submitted_outputs(&self) -> Vec<ToolOutput> {
        self.state().submitted.clone()
    }

    /// Messages currently on a thread
    pub fn messages(&self, thread_id: &str) -> Vec<RemoteMessage> {
        self.state()
            .threads
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self, op: &str) {
        let delay = self.state().delays.get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AssistantService for FakeAssistantService {
    async fn create_thread(&self) -> Result<String> {
        self.pause("create_thread").await;
        let mut state = self.state();
        state.record("create_thread")?;
        let id = state.next_id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn upload_file(&self, file: &NewFile) -> Result<RemoteFile> {
        self.pause("upload_file").await;
        let mut state = self.state();
        state.record("upload_file")?;
        let id = state.next_id("file");
        state
            .files
            .insert(id.clone(), (file.name.clone(), file.bytes.clone()));
        Ok(RemoteFile {
            id,
            filename: file.name.clone(),
        })
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        text: &str,
        file_ids: &[String],
    ) -> Result<String> {
        self.pause("add_message").await;
        let mut state = self.state();
        state.record("add_message")?;
        let id = state.next_id("msg");
        let message = RemoteMessage {
            id: id.clone(),
            role,
            parts: vec![RemotePart::Text {
                text: text.to_string(),
                file_ids: Vec::new(),
            }],
            attachments: file_ids.to_vec(),
        };
        state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| DataChatError::remote(format!("no thread {thread_id}")))?
            .push(message);
        Ok(id)
    }

    async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<RunSnapshot> {
        self.pause("create_run").await;
        let mut state = self.state();
        state.record("create_run")?;
        let run_id = state.next_id("run");
        state.position = 0;

        let replies = std::mem::take(&mut state.replies);
        for (parts, attachments) in replies {
            let id = state.next_id("msg");
            state
                .threads
                .entry(thread_id.to_string())
                .or_default()
                .push(RemoteMessage {
                    id,
                    role: Role::Assistant,
                    parts,
                    attachments,
                });
        }
        Ok(state.current_step().snapshot(&run_id))
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        self.pause("get_run").await;
        let mut state = self.state();
        state.record("get_run")?;
        if state.position + 1 < state.script.len() {
            state.position += 1;
        }
        Ok(state.current_step().snapshot(run_id))
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot> {
        self.pause("submit_tool_outputs").await;
        let mut state = self.state();
        state.record("submit_tool_outputs")?;
        state.submitted.extend_from_slice(outputs);
        Ok(RunSnapshot {
            id: run_id.to_string(),
            status: RunStatus::InProgress,
            tool_calls: Vec::new(),
            last_error: None,
        })
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        self.pause("cancel_run").await;
        let mut state = self.state();
        state.record("cancel_run")?;
        Ok(ScriptStep::Status(RunStatus::Cancelling).snapshot(run_id))
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        after: Option<String>,
    ) -> Result<Vec<RemoteMessage>> {
        self.pause("list_messages").await;
        let mut state = self.state();
        state.record("list_messages")?;
        let messages = state.threads.get(thread_id).cloned().unwrap_or_default();
        let start = after
            .and_then(|id| messages.iter().position(|m| m.id == id))
            .map(|i| i + 1)
            .unwrap_or(0);
        Ok(messages[start..].to_vec())
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile> {
        self.pause("retrieve_file").await;
        let mut state = self.state();
        state.record("retrieve_file")?;
        state
            .files
            .get(file_id)
            .map(|(name, _)| RemoteFile {
                id: file_id.to_string(),
                filename: name.clone(),
            })
            .ok_or_else(|| DataChatError::not_found(file_id))
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.pause("download_file").await;
        let mut state = self.state();
        state.record("download_file")?;
        state
            .files
            .get(file_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| DataChatError::not_found(file_id))
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<String> {
        self.pause("retrieve_assistant").await;
        let mut state = self.state();
        state.record("retrieve_assistant")?;
        if state.assistants.contains(assistant_id) {
            Ok(assistant_id.to_string())
        } else {
            Err(DataChatError::not_found(assistant_id))
        }
    }

    async fn create_assistant(&self, _definition: &AssistantDefinition) -> Result<String> {
        self.pause("create_assistant").await;
        let mut state = self.state();
        state.record("create_assistant")?;
        let id = state.next_id("asst");
        state.assistants.insert(id.clone());
        Ok(id)
    }

    async fn moderate(&self, _text: &str) -> Result<bool> {
        self.pause("moderate").await;
        let mut state = self.state();
        state.record("moderate")?;
        Ok(state.flagged)
    }
}

/// Clock that only moves when slept on or advanced
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without sleeping
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) += by;
    }

    /// Every sleep requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

/// Shorthand for a tool call
pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}
