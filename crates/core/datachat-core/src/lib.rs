//! DataChat Core
//!
//! Conversation orchestration for a data-analysis chat backed by a hosted
//! assistant service. It includes:
//!
//! - Sessions holding a thread, an append-only transcript and uploaded files
//! - The run orchestrator: upload, post, poll, answer tool calls, collect replies
//! - A closed set of locally resolved function tools
//! - An in-memory session store serializing turns per session
//! - Environment-driven configuration and tracing-based logging
//!
//! # Example
//!
//! ```no_run
//! use datachat_core::*;
//! use std::sync::Arc;
//!
//! # async fn demo(service: Arc<dyn AssistantService>) -> Result<()> {
//! let orchestrator = Orchestrator::new(service, OrchestratorConfig::from_env());
//! let mut session = Session::new("session-1", "asst-123");
//! orchestrator
//!     .submit_turn(&mut session, "Which column has the most missing values?", Vec::new())
//!     .await?;
//! println!("{}", session.transcript().last().map(|e| e.text()).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assistant;
pub mod clock;
pub mod config;
pub mod echo;
pub mod error;
pub mod orchestrator;
pub mod resilience;
pub mod service;
pub mod session_store;
pub mod testing;
pub mod tools;
pub mod types;
pub mod utils;

// Re-export main types
pub use assistant::{analysis_assistant, ensure_assistant, ASSISTANT_NAME};
pub use clock::{Clock, TokioClock};
pub use config::{
    get_env_bool, get_env_int, get_env_or, get_required_env, load_env_from_path, validate_env,
    AssistantConfig, OrchestratorConfig, MIN_POLL_INTERVAL,
};
pub use echo::echo_turn;
pub use error::{DataChatError, ErrorKind, Result};
pub use orchestrator::{Orchestrator, ACCEPTED_EXTENSIONS};
pub use resilience::{retry_with_backoff, RetryConfig};
pub use service::AssistantService;
pub use session_store::SessionStore;
pub use tools::{FunctionDefinition, LocalTool, ToolContext, ToolRegistry};
pub use types::*;
pub use utils::{init_logging, scrub_secrets, subscribe_logs, LogEvent};
