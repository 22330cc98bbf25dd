use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use datachat_core::{DataChatError, ErrorKind};
use tracing::error;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request or rejected turn
    BadRequest(ErrorKind, String),
    /// Unknown or expired file
    NotFound(String),
    /// A turn is already running on the session
    Conflict(String),
    /// The assistant service failed
    BadGateway(String),
    /// Anything else
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(kind, _) => *kind,
            ApiError::NotFound(_) => ErrorKind::FileNotFound,
            ApiError::Conflict(_) => ErrorKind::SessionBusy,
            ApiError::BadGateway(_) => ErrorKind::RemoteUnavailable,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match self {
            ApiError::BadRequest(_, msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message,
            "kind": kind,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<DataChatError> for ApiError {
    fn from(err: DataChatError) -> Self {
        let message = err.user_message();
        match err.kind() {
            kind @ (ErrorKind::InvalidTurn | ErrorKind::Flagged) => {
                ApiError::BadRequest(kind, message)
            }
            ErrorKind::FileNotFound => ApiError::NotFound(message),
            ErrorKind::SessionBusy => ApiError::Conflict(
                "A previous question is still being analyzed. Please wait for it to finish."
                    .to_string(),
            ),
            ErrorKind::RemoteUnavailable | ErrorKind::RunFailed | ErrorKind::RunTimeout => {
                ApiError::BadGateway(message)
            }
            ErrorKind::UnknownTool | ErrorKind::Config | ErrorKind::Internal => {
                error!("DataChatError: {}", err);
                ApiError::Internal(message)
            }
        }
    }
}
