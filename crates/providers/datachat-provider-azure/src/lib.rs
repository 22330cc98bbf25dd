//! Azure OpenAI Assistants integration for DataChat
//!
//! [`AzureAssistantClient`] implements [`AssistantService`] over the
//! Assistants REST API (`{endpoint}/openai/...?api-version=...`). Reads are
//! retried with backoff; writes are sent once.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod wire;

use async_trait::async_trait;
use datachat_core::types::{
    AssistantDefinition, NewFile, RemoteFile, RemoteMessage, Role, RunSnapshot, ToolOutput,
};
use datachat_core::{
    retry_with_backoff, AssistantConfig, AssistantService, DataChatError, Result, RetryConfig,
};
use reqwest::{multipart, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use wire::*;

/// Page size used when listing thread messages
const PAGE_LIMIT: &str = "100";

/// Assistants API client authenticated with an Azure `api-key`
#[derive(Clone)]
pub struct AzureAssistantClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
    retry: RetryConfig,
}

impl AzureAssistantClient {
    /// Build a client from configuration
    pub fn new(config: &AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(300))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DataChatError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/openai", config.endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            retry: RetryConfig::default(),
        })
    }

    /// Override the retry policy for idempotent reads
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", path);
        let resp = self
            .client
            .post(self.url(path))
            .header("api-key", &self.api_key)
            .query(&[("api-version", self.api_version.as_str())])
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp, None).await?;
        decode(resp).await
    }

    /// GET with retries; `not_found` turns a 404 into `FileNotFound` for that id
    async fn get(
        &self,
        path: &str,
        query: Vec<(&'static str, String)>,
        not_found: Option<&str>,
    ) -> Result<Response> {
        debug!("GET {}", path);
        let client = self.client.clone();
        let url = self.url(path);
        let api_key = self.api_key.clone();
        let mut query = query;
        query.push(("api-version", self.api_version.clone()));
        let not_found = not_found.map(str::to_string);

        retry_with_backoff(&self.retry, move || {
            let request = client
                .get(&url)
                .header("api-key", &api_key)
                .query(&query);
            let not_found = not_found.clone();
            Box::pin(async move {
                let resp = request.send().await.map_err(transport_error)?;
                check_status(resp, not_found.as_deref()).await
            })
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, not_found: Option<&str>) -> Result<T> {
        let resp = self.get(path, Vec::new(), not_found).await?;
        decode(resp).await
    }
}

#[async_trait]
impl AssistantService for AzureAssistantClient {
    async fn create_thread(&self) -> Result<String> {
        let thread: ObjectId = self.post_json("threads", &serde_json::json!({})).await?;
        Ok(thread.id)
    }

    async fn upload_file(&self, file: &NewFile) -> Result<RemoteFile> {
        debug!("Uploading {} ({} bytes)", file.name, file.bytes.len());
        let part = multipart::Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let resp = self
            .client
            .post(self.url("files"))
            .header("api-key", &self.api_key)
            .query(&[("api-version", self.api_version.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp, None).await?;
        let uploaded: WireFile = decode(resp).await?;
        Ok(uploaded.into())
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        text: &str,
        file_ids: &[String],
    ) -> Result<String> {
        let body = CreateMessageRequest {
            role,
            content: text,
            attachments: file_ids
                .iter()
                .map(|id| AttachmentRequest::code_interpreter(id))
                .collect(),
        };
        let message: ObjectId = self
            .post_json(&format!("threads/{thread_id}/messages"), &body)
            .await?;
        Ok(message.id)
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunSnapshot> {
        let run: WireRun = self
            .post_json(
                &format!("threads/{thread_id}/runs"),
                &CreateRunRequest { assistant_id },
            )
            .await?;
        Ok(run.into())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        let run: WireRun = self
            .get_json(&format!("threads/{thread_id}/runs/{run_id}"), None)
            .await?;
        Ok(run.into())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot> {
        let run: WireRun = self
            .post_json(
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &SubmitToolOutputsRequest {
                    tool_outputs: outputs,
                },
            )
            .await?;
        Ok(run.into())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        let run: WireRun = self
            .post_json(
                &format!("threads/{thread_id}/runs/{run_id}/cancel"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(run.into())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        after: Option<String>,
    ) -> Result<Vec<RemoteMessage>> {
        let path = format!("threads/{thread_id}/messages");
        let mut cursor = after;
        let mut messages = Vec::new();

        loop {
            let mut query = vec![("order", "asc".to_string()), ("limit", PAGE_LIMIT.to_string())];
            if let Some(after) = &cursor {
                query.push(("after", after.clone()));
            }
            let resp = self.get(&path, query, None).await?;
            let page: MessageList = decode(resp).await?;

            let last_id = page
                .last_id
                .clone()
                .or_else(|| page.data.last().map(|m| m.id.clone()));
            messages.extend(page.data.into_iter().map(RemoteMessage::from));

            match (page.has_more, last_id) {
                (true, Some(last)) => cursor = Some(last),
                _ => break,
            }
        }

        debug!("Listed {} message(s) on {}", messages.len(), thread_id);
        Ok(messages)
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<RemoteFile> {
        let file: WireFile = self
            .get_json(&format!("files/{file_id}"), Some(file_id))
            .await?;
        Ok(file.into())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .get(&format!("files/{file_id}/content"), Vec::new(), Some(file_id))
            .await?;
        let bytes = resp.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<String> {
        let assistant: ObjectId = self
            .get_json(&format!("assistants/{assistant_id}"), None)
            .await?;
        Ok(assistant.id)
    }

    async fn create_assistant(&self, definition: &AssistantDefinition) -> Result<String> {
        let assistant: ObjectId = self.post_json("assistants", definition).await?;
        Ok(assistant.id)
    }

    async fn moderate(&self, text: &str) -> Result<bool> {
        let resp: ModerationResponse = self
            .post_json("moderations", &ModerationRequest { input: text })
            .await?;
        Ok(resp.results.iter().any(|r| r.flagged))
    }
}

fn transport_error(e: reqwest::Error) -> DataChatError {
    DataChatError::remote(e.to_string())
}

async fn check_status(resp: Response, not_found: Option<&str>) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = not_found {
            return Err(DataChatError::not_found(id));
        }
    }

    let error_text = resp.text().await.unwrap_or_default();
    warn!("Assistants API error {}: {}", status, error_text);
    Err(DataChatError::remote(format!(
        "Assistants API error {}: {}",
        status,
        error_text.chars().take(500).collect::<String>()
    )))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let body = resp.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&body)
        .map_err(|e| DataChatError::remote(format!("Unexpected response body: {e}")))
}
