//! Conversation orchestrator
//!
//! Turns one user submission into the sequence of remote calls that answer
//! it and flattens the outcome into the session transcript:
//!
//! ```text
//! created -> thread-ensured -> files-uploaded -> message-sent -> run-started
//!         -> { polling <-> tool-action }
//!         -> terminal(completed | failed | cancelled | expired | timeout)
//!         -> transcript-updated
//! ```
//!
//! Only validation, moderation and busy-thread errors are returned to the
//! caller. Every failure after that point lands in the transcript as an
//! assistant entry carrying an [`ErrorKind`](crate::ErrorKind), so the session
//! stays usable.
//!
//! The run timeout is a wall-clock bound on the whole turn: every remote call
//! races the time left until the deadline, measured on the injected [`Clock`].

use crate::clock::{Clock, TokioClock};
use crate::config::OrchestratorConfig;
use crate::service::AssistantService;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{
    ContentPart, FileReference, NewFile, RemotePart, Role, RunSnapshot, RunStatus, Session,
    ToolCall, UploadedFile,
};
use crate::{DataChatError, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// File extensions accepted for upload
pub const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls", "json", "txt"];

const EMPTY_REPLY: &str = "The assistant finished without producing a reply.";

/// Message sent when the user uploads files without asking anything
const FILES_ONLY_PROMPT: &str = "Please analyze the uploaded file(s).";

/// Drives user turns against the remote assistant
pub struct Orchestrator {
    service: Arc<dyn AssistantService>,
    clock: Arc<dyn Clock>,
    tools: ToolRegistry,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator using the tokio clock and every local tool
    pub fn new(service: Arc<dyn AssistantService>, config: OrchestratorConfig) -> Self {
        Self {
            service,
            clock: Arc::new(TokioClock::new()),
            tools: ToolRegistry::default(),
            config,
        }
    }

    /// Replace the clock used by the poll loop
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the enabled tools
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Submit one user turn and wait for the assistant's answer
    ///
    /// Fails with `InvalidTurn` (empty turn, unsupported file) or `Flagged`
    /// (moderation) before any thread, file or run call, and with
    /// `SessionBusy` while a run from an earlier timed-out turn is still
    /// active on the thread. Nothing is appended to the transcript then.
    pub async fn submit_turn(
        &self,
        session: &mut Session,
        text: &str,
        files: Vec<NewFile>,
    ) -> Result<()> {
        validate_turn(text, &files)?;
        let deadline = self.clock.now() + self.config.run_timeout;
        if self.config.moderation_enabled && !text.trim().is_empty() {
            self.check_moderation(text, deadline).await?;
        }
        self.ensure_idle(session, deadline).await?;
        if let Err(e) = self.run_turn(session, text, &files, deadline).await {
            record_failure(session, &e);
        }
        Ok(())
    }

    /// Fresh session with the same token and assistant; remote resources are left alone
    pub fn reset(&self, session: Session) -> Session {
        info!(
            "Resetting session {} (thread {:?}, {} entries)",
            session.id(),
            session.thread_id(),
            session.transcript().len()
        );
        session.reset()
    }

    /// Bytes of a file referenced by the session, fetched once and cached
    pub async fn download(&self, session: &mut Session, file: &FileReference) -> Result<Vec<u8>> {
        let remote_id = file
            .remote_id
            .as_deref()
            .ok_or_else(|| DataChatError::not_found(&file.name))?;

        if let Some(bytes) = session.cached_bytes(remote_id) {
            return Ok(bytes.to_vec());
        }
        if session.file_name(remote_id).is_none() {
            debug!(
                "Session {} has no reference to file {}",
                session.id(),
                remote_id
            );
            return Err(DataChatError::not_found(remote_id));
        }

        let bytes = self.service.download_file(remote_id).await?;
        info!("Downloaded file {} ({} bytes)", remote_id, bytes.len());
        session
            .file_cache
            .insert(remote_id.to_string(), bytes.clone());
        Ok(bytes)
    }

    async fn check_moderation(&self, text: &str, deadline: Duration) -> Result<()> {
        match self.bounded(deadline, self.service.moderate(text)).await {
            Ok(true) => {
                warn!("User message flagged by moderation");
                Err(DataChatError::Flagged(
                    "Your question has been flagged. Please try a different question.".into(),
                ))
            }
            Ok(false) => Ok(()),
            Err(e) => {
                error!("Error checking moderation: {}", e);
                Ok(())
            }
        }
    }

    /// Check on the run a previous turn left behind
    async fn ensure_idle(&self, session: &mut Session, deadline: Duration) -> Result<()> {
        let (Some(thread_id), Some(run_id)) =
            (session.thread_id.clone(), session.active_run.clone())
        else {
            return Ok(());
        };

        let run = self
            .bounded(deadline, self.service.get_run(&thread_id, &run_id))
            .await?;
        if run.status.is_terminal() {
            debug!("Earlier run {} finished {}", run_id, run.status);
            session.active_run = None;
            return Ok(());
        }

        warn!(
            "Session {} still has run {} {}; refusing new turn",
            session.id(),
            run_id,
            run.status
        );
        if self.config.cancel_on_timeout && run.status != RunStatus::Cancelling {
            self.cancel(&thread_id, &run_id).await;
        }
        Err(DataChatError::SessionBusy(session.id().to_string()))
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        text: &str,
        files: &[NewFile],
        deadline: Duration,
    ) -> Result<()> {
        let mut uploaded = Vec::with_capacity(files.len());
        let prepared = self.prepare(session, files, &mut uploaded, deadline).await;

        let mut parts = Vec::new();
        if !text.trim().is_empty() {
            parts.push(ContentPart::text(text));
        }
        parts.extend(uploaded.iter().map(|f| ContentPart::File { file: f.reference() }));
        parts.extend(
            files[uploaded.len()..]
                .iter()
                .map(|f| ContentPart::File {
                    file: FileReference::local(&f.name),
                }),
        );
        session.transcript.append(Role::User, parts, None);

        let thread_id = prepared?;
        let file_ids: Vec<String> = uploaded.iter().map(|f| f.remote_id.clone()).collect();
        let prompt = if text.trim().is_empty() {
            FILES_ONLY_PROMPT
        } else {
            text
        };
        let message_id = self
            .bounded(
                deadline,
                self.service
                    .add_message(&thread_id, Role::User, prompt, &file_ids),
            )
            .await?;
        session.message_cursor = Some(message_id);

        let run = self
            .bounded(
                deadline,
                self.service.create_run(&thread_id, session.assistant_id()),
            )
            .await?;
        info!("Started run {} on thread {}", run.id, thread_id);

        self.drive_run(session, &thread_id, run, deadline).await?;
        self.collect_reply(session, &thread_id, deadline).await
    }

    async fn prepare(
        &self,
        session: &mut Session,
        files: &[NewFile],
        uploaded: &mut Vec<UploadedFile>,
        deadline: Duration,
    ) -> Result<String> {
        let thread_id = match session.thread_id.clone() {
            Some(id) => id,
            None => {
                let id = self.bounded(deadline, self.service.create_thread()).await?;
                info!("Created new thread: {}", id);
                session.thread_id = Some(id.clone());
                id
            }
        };

        for file in files {
            let remote = self
                .bounded(deadline, self.service.upload_file(file))
                .await?;
            info!("Uploaded file: {} with ID: {}", file.name, remote.id);
            let record = UploadedFile {
                name: file.name.clone(),
                remote_id: remote.id,
                bytes: file.bytes.clone(),
            };
            session.uploaded_files.push(record.clone());
            uploaded.push(record);
        }

        Ok(thread_id)
    }

    /// Poll a freshly created run, remembering it on the session until it ends
    async fn drive_run(
        &self,
        session: &mut Session,
        thread_id: &str,
        run: RunSnapshot,
        deadline: Duration,
    ) -> Result<()> {
        let run_id = run.id.clone();
        session.active_run = Some(run_id.clone());

        let outcome = self.poll_run(session, thread_id, run, deadline).await;
        match &outcome {
            Ok(()) | Err(DataChatError::RunFailed { .. }) => session.active_run = None,
            Err(DataChatError::RunTimeout(_)) => {
                warn!(
                    "Run {} not finished after {:?}",
                    run_id, self.config.run_timeout
                );
                if self.config.cancel_on_timeout {
                    self.cancel(thread_id, &run_id).await;
                }
            }
            Err(_) => {}
        }
        outcome
    }

    async fn poll_run(
        &self,
        session: &Session,
        thread_id: &str,
        mut run: RunSnapshot,
        deadline: Duration,
    ) -> Result<()> {
        let mut answered: HashSet<String> = HashSet::new();

        loop {
            debug!("Run {} status: {}", run.id, run.status);
            match run.status {
                RunStatus::Completed => {
                    info!("Run {} completed", run.id);
                    return Ok(());
                }
                status if status.is_terminal() => {
                    error!("Run {} ended {}: {:?}", run.id, status, run.last_error);
                    return Err(DataChatError::run_failed(status, run.last_error));
                }
                RunStatus::RequiresAction => {
                    let pending: Vec<ToolCall> = run
                        .tool_calls
                        .iter()
                        .filter(|call| !answered.contains(&call.id))
                        .cloned()
                        .collect();
                    if !pending.is_empty() {
                        info!("Run {} requires {} tool output(s)", run.id, pending.len());
                        let ctx = ToolContext {
                            uploaded_files: session.uploaded_files(),
                        };
                        let outputs = self.tools.resolve_all(&pending, &ctx);
                        let after = self
                            .bounded(
                                deadline,
                                self.service
                                    .submit_tool_outputs(thread_id, &run.id, &outputs),
                            )
                            .await?;
                        answered.extend(pending.into_iter().map(|call| call.id));
                        debug!("Run {} after tool outputs: {}", after.id, after.status);
                    }
                }
                _ => {}
            }

            let now = self.clock.now();
            if now >= deadline {
                debug!("Run {} still {} at deadline", run.id, run.status);
                return Err(DataChatError::RunTimeout(self.config.run_timeout));
            }

            self.clock
                .sleep(self.config.poll_interval.min(deadline - now))
                .await;
            run = self
                .bounded(deadline, self.service.get_run(thread_id, &run.id))
                .await?;
        }
    }

    async fn collect_reply(
        &self,
        session: &mut Session,
        thread_id: &str,
        deadline: Duration,
    ) -> Result<()> {
        let messages = self
            .bounded(
                deadline,
                self.service
                    .list_messages(thread_id, session.message_cursor.clone()),
            )
            .await?;

        let mut parts = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut generated = Vec::new();

        for message in messages.iter().filter(|m| m.role == Role::Assistant) {
            for part in &message.parts {
                match part {
                    RemotePart::Text { text, file_ids } => {
                        if !text.trim().is_empty() {
                            parts.push(ContentPart::text(text.clone()));
                        }
                        for id in file_ids {
                            if seen.insert(id.clone()) {
                                generated.push(id.clone());
                            }
                        }
                    }
                    RemotePart::ImageFile { file_id } => {
                        if seen.insert(file_id.clone()) {
                            let file = FileReference::remote(format!("{file_id}.png"), file_id);
                            parts.push(ContentPart::Image { file });
                            self.prefetch(session, file_id, deadline).await;
                        }
                    }
                }
            }
            for id in &message.attachments {
                if seen.insert(id.clone()) {
                    generated.push(id.clone());
                }
            }
        }

        for file_id in generated {
            let name = match self
                .bounded(deadline, self.service.retrieve_file(&file_id))
                .await
            {
                Ok(meta) => meta.filename,
                Err(e) => {
                    warn!("Could not resolve name of file {}: {}", file_id, e);
                    file_id.clone()
                }
            };
            parts.push(ContentPart::File {
                file: FileReference::remote(name, &file_id),
            });
            self.prefetch(session, &file_id, deadline).await;
        }

        if let Some(last) = messages.last() {
            session.message_cursor = Some(last.id.clone());
        }
        if parts.is_empty() {
            warn!("Run on thread {} produced no assistant content", thread_id);
            parts.push(ContentPart::text(EMPTY_REPLY));
        }
        session.transcript.append(Role::Assistant, parts, None);
        Ok(())
    }

    async fn prefetch(&self, session: &mut Session, file_id: &str, deadline: Duration) {
        if !self.config.eager_downloads || session.is_cached(file_id) {
            return;
        }
        match self
            .bounded(deadline, self.service.download_file(file_id))
            .await
        {
            Ok(bytes) => {
                session.file_cache.insert(file_id.to_string(), bytes);
            }
            Err(e) => warn!("Deferred download of {} after failure: {}", file_id, e),
        }
    }

    /// Best-effort cancel, given one poll interval to be acknowledged
    async fn cancel(&self, thread_id: &str, run_id: &str) {
        match self
            .within(
                self.config.poll_interval,
                self.service.cancel_run(thread_id, run_id),
            )
            .await
        {
            Some(Ok(run)) => info!("Requested cancellation of run {} ({})", run_id, run.status),
            Some(Err(e)) => warn!("Failed to cancel run {}: {}", run_id, e),
            None => warn!("Cancel of run {} was not acknowledged", run_id),
        }
    }

    /// Remote call cut off once the turn's deadline passes
    async fn bounded<T>(
        &self,
        deadline: Duration,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let remaining = deadline.saturating_sub(self.clock.now());
        self.within(remaining, call)
            .await
            .unwrap_or(Err(DataChatError::RunTimeout(self.config.run_timeout)))
    }

    /// `None` when `limit` elapses on the clock before `call` resolves
    async fn within<T>(
        &self,
        limit: Duration,
        call: impl Future<Output = Result<T>>,
    ) -> Option<Result<T>> {
        tokio::select! {
            biased;
            result = call => Some(result),
            _ = self.clock.sleep(limit) => None,
        }
    }
}

fn validate_turn(text: &str, files: &[NewFile]) -> Result<()> {
    if text.trim().is_empty() && files.is_empty() {
        return Err(DataChatError::invalid_turn(
            "Enter a question or upload a file",
        ));
    }
    for file in files {
        let ext = file
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(DataChatError::invalid_turn(format!(
                "Unsupported file type for '{}'; accepted: {}",
                file.name,
                ACCEPTED_EXTENSIONS.join(", ")
            )));
        }
    }
    Ok(())
}

fn record_failure(session: &mut Session, err: &DataChatError) {
    match err {
        DataChatError::RunTimeout(_) => warn!("Turn on session {} timed out", session.id()),
        _ => error!("Turn on session {} failed: {}", session.id(), err),
    }
    session.transcript.append(
        Role::Assistant,
        vec![ContentPart::text(err.user_message())],
        Some(err.kind()),
    );
}
