//! Configuration management and environment variable loading

use crate::{DataChatError, Result};
use std::env;
use std::path::Path;
use std::time::Duration;

/// API version of the assistants endpoints
pub const DEFAULT_API_VERSION: &str = "2024-05-01-preview";

/// Deployment used when `AZURE_DEPLOYMENT_NAME` is unset
pub const DEFAULT_DEPLOYMENT_NAME: &str = "gpt-4o";

/// Assistant id tried when `AZURE_ASSISTANT_ID` is unset; retrieval fails and a new one is created
pub const DEFAULT_ASSISTANT_ID: &str = "assistant_id_fallback";

/// Load environment variables from a specific file
///
/// Returns whether the file was found. A missing file is not an error; the
/// process environment is used as is. Nothing is logged here so the call can
/// run before logging is configured from the loaded variables.
///
/// ```no_run
/// use datachat_core::load_env_from_path;
///
/// let loaded = load_env_from_path(".env.local").unwrap_or(false);
/// ```
pub fn load_env_from_path<P: AsRef<Path>>(path: P) -> Result<bool> {
    match dotenvy::from_path(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(_)) => Ok(false),
        Err(e) => Err(DataChatError::config(format!(
            "Failed to load {} environment file: {}",
            path.as_ref().display(),
            e
        ))),
    }
}

/// Get required environment variable
///
/// Returns an error if the variable is not set or empty
pub fn get_required_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DataChatError::config(format!(
            "Required environment variable '{}' is not set. \
             Check your .env.local file or system environment.",
            key
        ))),
    }
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Validate that required environment variables are set
pub fn validate_env(required_vars: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required_vars
        .iter()
        .copied()
        .filter(|var| env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true))
        .collect();

    if !missing.is_empty() {
        return Err(DataChatError::config(format!(
            "Missing required environment variables: {}. \
             Add them to .env.local or export them before starting.",
            missing.join(", ")
        )));
    }

    Ok(())
}

/// Credentials and identifiers for the hosted assistant
#[derive(Clone)]
pub struct AssistantConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    /// API key sent with every request
    pub api_key: String,
    /// `api-version` query parameter
    pub api_version: String,
    /// Model deployment used when creating the assistant
    pub deployment_name: String,
    /// Pre-existing assistant to reuse
    pub assistant_id: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl AssistantConfig {
    /// Read `AZURE_OPENAI_*`, `AZURE_DEPLOYMENT_NAME` and `AZURE_ASSISTANT_ID`
    pub fn from_env() -> Result<Self> {
        validate_env(&["AZURE_OPENAI_API_KEY", "AZURE_OPENAI_ENDPOINT"])?;
        Ok(Self {
            endpoint: get_required_env("AZURE_OPENAI_ENDPOINT")?
                .trim_end_matches('/')
                .to_string(),
            api_key: get_required_env("AZURE_OPENAI_API_KEY")?,
            api_version: get_env_or("AZURE_OPENAI_API_VERSION", DEFAULT_API_VERSION),
            deployment_name: get_env_or("AZURE_DEPLOYMENT_NAME", DEFAULT_DEPLOYMENT_NAME),
            assistant_id: get_env_or("AZURE_ASSISTANT_ID", DEFAULT_ASSISTANT_ID),
            request_timeout: Duration::from_secs(get_env_int(
                "DATACHAT_REQUEST_TIMEOUT_SECS",
                60u64,
            )),
        })
    }
}

impl std::fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("deployment_name", &self.deployment_name)
            .field("assistant_id", &self.assistant_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Shortest accepted delay between run status polls
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll loop and turn handling knobs
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between run status polls
    pub poll_interval: Duration,
    /// Wall-clock bound for one `submit_turn`
    pub run_timeout: Duration,
    /// Download generated files and images as soon as a run completes
    pub eager_downloads: bool,
    /// Check user text with the moderation endpoint before sending it
    pub moderation_enabled: bool,
    /// Ask the service to cancel a run that timed out
    pub cancel_on_timeout: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            run_timeout: Duration::from_secs(300),
            eager_downloads: false,
            moderation_enabled: false,
            cancel_on_timeout: false,
        }
    }
}

impl OrchestratorConfig {
    /// Read the `DATACHAT_*` overrides, falling back to defaults
    ///
    /// The poll interval is raised to [`MIN_POLL_INTERVAL`] if set lower.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(get_env_int(
                "DATACHAT_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            ))
            .max(MIN_POLL_INTERVAL),
            run_timeout: Duration::from_secs(get_env_int(
                "DATACHAT_RUN_TIMEOUT_SECS",
                defaults.run_timeout.as_secs(),
            )),
            eager_downloads: get_env_bool("DATACHAT_EAGER_DOWNLOADS", defaults.eager_downloads),
            moderation_enabled: get_env_bool(
                "DATACHAT_MODERATION_ENABLED",
                defaults.moderation_enabled,
            ),
            cancel_on_timeout: get_env_bool(
                "DATACHAT_CANCEL_ON_TIMEOUT",
                defaults.cancel_on_timeout,
            ),
        }
    }
}
