use crate::error::ApiError;
use crate::ChatUiServer;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use datachat_core::types::{FileReference, NewFile, Session, TranscriptEntry};
use datachat_core::{echo_turn, ErrorKind, SessionStore, ACCEPTED_EXTENSIONS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EchoRequest {
    #[serde(default)]
    pub session: Option<String>,
    pub text: String,
}

/// Transcript as returned by every chat endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResponse {
    pub success: bool,
    pub session: String,
    pub thread_id: Option<String>,
    pub entries: Vec<TranscriptEntry>,
}

impl TranscriptResponse {
    /// Response for a token with no session behind it yet
    fn empty(token: &str) -> Self {
        Self {
            success: true,
            session: token.to_string(),
            thread_id: None,
            entries: Vec::new(),
        }
    }
}

impl From<&Session> for TranscriptResponse {
    fn from(session: &Session) -> Self {
        Self {
            success: true,
            session: session.id().to_string(),
            thread_id: session.thread_id().map(str::to_string),
            entries: session.transcript().entries().to_vec(),
        }
    }
}

pub async fn analysis_index(State(state): State<ChatUiServer>) -> Html<String> {
    Html(crate::pages::analysis_page(
        ACCEPTED_EXTENSIONS,
        state.config.logs_enabled,
    ))
}

pub async fn echo_index(State(state): State<ChatUiServer>) -> Html<String> {
    Html(crate::pages::echo_page(state.config.logs_enabled))
}

pub async fn create_session(State(state): State<ChatUiServer>) -> Json<TranscriptResponse> {
    let token = state.sessions.create().await;
    let session = state.sessions.acquire(&token).await;
    Json(TranscriptResponse::from(&*session))
}

pub async fn transcript(
    State(state): State<ChatUiServer>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    read_transcript(&state.sessions, query).await
}

/// Read-only lookup; an unknown token reads as an empty conversation
async fn read_transcript(
    sessions: &SessionStore,
    query: SessionQuery,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let token = query.session.ok_or_else(missing_session)?;
    let response = match sessions.acquire_existing(&token).await {
        Some(session) => TranscriptResponse::from(&*session),
        None => TranscriptResponse::empty(&token),
    };
    Ok(Json(response))
}

pub async fn chat(
    State(state): State<ChatUiServer>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let mut token = None;
    let mut text = String::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(ErrorKind::InvalidTurn, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "session" => {
                token = Some(field.text().await.map_err(bad_field)?);
            }
            "text" => {
                text = field.text().await.map_err(bad_field)?;
            }
            "files" | "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_field)?;
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                files.push(NewFile::new(file_name, bytes.to_vec()));
            }
            other => debug!("Ignoring multipart field {}", other),
        }
    }

    let token = state.sessions.get_or_create(token.as_deref()).await;
    let mut session = state.sessions.try_acquire(&token).await?;
    info!(
        "Chat turn on session {} ({} chars, {} file(s))",
        token,
        text.len(),
        files.len()
    );
    state
        .orchestrator
        .submit_turn(&mut session, &text, files)
        .await?;
    Ok(Json(TranscriptResponse::from(&*session)))
}

pub async fn reset(
    State(state): State<ChatUiServer>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let token = state
        .sessions
        .get_or_create(request.session.as_deref())
        .await;
    let mut session = state.sessions.try_acquire(&token).await?;
    let placeholder = Session::new(session.id(), session.assistant_id());
    let current = std::mem::replace(&mut *session, placeholder);
    *session = state.orchestrator.reset(current);
    Ok(Json(TranscriptResponse::from(&*session)))
}

pub async fn download(
    State(state): State<ChatUiServer>,
    Path(file_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    let token = query.session.ok_or_else(missing_session)?;
    let mut session = state
        .sessions
        .acquire_existing(&token)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No session {token}")))?;
    let name = session
        .file_name(&file_id)
        .map(str::to_string)
        .unwrap_or_else(|| file_id.clone());

    let bytes = state
        .orchestrator
        .download(&mut session, &FileReference::remote(&name, &file_id))
        .await
        .map_err(|e| {
            warn!("Download of {} failed: {}", file_id, e);
            ApiError::from(e)
        })?;

    let disposition = format!("attachment; filename=\"{}\"", name.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&name).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn echo(
    State(state): State<ChatUiServer>,
    Json(request): Json<EchoRequest>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let token = state
        .echo_sessions
        .get_or_create(request.session.as_deref())
        .await;
    let mut session = state.echo_sessions.try_acquire(&token).await?;
    echo_turn(&mut session, &request.text)?;
    Ok(Json(TranscriptResponse::from(&*session)))
}

pub async fn echo_transcript(
    State(state): State<ChatUiServer>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    read_transcript(&state.echo_sessions, query).await
}

fn missing_session() -> ApiError {
    ApiError::BadRequest(ErrorKind::InvalidTurn, "missing session".into())
}

fn bad_field(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(ErrorKind::InvalidTurn, format!("Could not read upload: {e}"))
}

fn content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "csv" => "text/csv",
        "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("chart.PNG"), "image/png");
        assert_eq!(content_type("data.csv"), "text/csv");
        assert_eq!(content_type("file-abc"), "application/octet-stream");
    }
}
