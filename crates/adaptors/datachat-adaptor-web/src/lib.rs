//! Web UI for DataChat
//!
//! Serves the data-analysis chat page at `/`, the echo chat at `/echo`, and
//! the JSON API both pages talk to. Sessions are keyed by a token the page
//! keeps in localStorage.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod handlers;
mod logs;
mod pages;

pub use error::ApiError;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use datachat_core::session_store::{DEFAULT_IDLE_TTL, DEFAULT_MAX_SESSIONS};
use datachat_core::{Orchestrator, Result, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assistant id echo sessions are bound to; they never reach the service
const ECHO_ASSISTANT: &str = "echo";

/// Listener and feature switches
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Serve `/logs` and show the live log panel
    pub logs_enabled: bool,
    /// Largest accepted request body, uploads included
    pub max_upload_bytes: usize,
    /// Idle time after which a session is dropped
    pub session_idle_ttl: Duration,
    /// Live sessions kept per page before the least recently used is dropped
    pub max_sessions: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8501,
            logs_enabled: false,
            max_upload_bytes: 50 * 1024 * 1024,
            session_idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct ChatUiServer {
    pub(crate) config: Arc<WebConfig>,
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) echo_sessions: Arc<SessionStore>,
}

impl ChatUiServer {
    /// Create a server whose analysis sessions run against `assistant_id`
    pub fn new(config: WebConfig, orchestrator: Orchestrator, assistant_id: &str) -> Self {
        let store = |assistant: &str| {
            Arc::new(
                SessionStore::new(assistant)
                    .with_limits(config.session_idle_ttl, config.max_sessions),
            )
        };
        let sessions = store(assistant_id);
        let echo_sessions = store(ECHO_ASSISTANT);
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            sessions,
            echo_sessions,
        }
    }

    /// Analysis sessions
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// All routes, with tracing and the upload limit applied
    pub fn router(&self) -> Router {
        let mut r = Router::new()
            .route("/", get(handlers::analysis_index))
            .route("/echo", get(handlers::echo_index))
            .route("/api/session", post(handlers::create_session))
            .route("/api/transcript", get(handlers::transcript))
            .route("/api/chat", post(handlers::chat))
            .route("/api/reset", post(handlers::reset))
            .route("/api/files/:file_id", get(handlers::download))
            .route("/api/echo", post(handlers::echo))
            .route("/api/echo/transcript", get(handlers::echo_transcript))
            .with_state(self.clone());
        if self.config.logs_enabled {
            r = r.route("/logs", get(logs::logs_sse));
        }
        r.layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.config.max_upload_bytes))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until Ctrl-C
    pub async fn serve(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Chat UI listening on http://{}", addr);

        let sweep_every = (self.config.session_idle_ttl / 4).max(Duration::from_secs(1));
        let sweepers = [
            self.sessions.spawn_sweeper(sweep_every),
            self.echo_sessions.spawn_sweeper(sweep_every),
        ];

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down chat UI");
            })
            .await;
        for sweeper in sweepers {
            sweeper.abort();
        }
        served?;
        Ok(())
    }
}
