use clap::Parser;
use datachat_adaptor_web::{ChatUiServer, WebConfig};
use datachat_core::{
    ensure_assistant, init_logging, load_env_from_path, AssistantConfig, Orchestrator,
    OrchestratorConfig, ToolRegistry,
};
use datachat_provider_azure::AzureAssistantClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "run-chat-ui", about = "Data-analysis chat over Azure OpenAI Assistants")]
struct Cli {
    #[arg(long, env = "DATACHAT_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "DATACHAT_PORT", default_value_t = 8501)]
    port: u16,

    /// Stream server logs to the page
    #[arg(long, env = "DATACHAT_LOGS_ENABLED")]
    logs: bool,

    #[arg(long, default_value = ".env.local")]
    env_file: String,

    #[arg(long, env = "DATACHAT_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Minutes a session may sit idle before it is dropped
    #[arg(long, env = "DATACHAT_SESSION_IDLE_MINS", default_value_t = 60)]
    session_idle_mins: u64,

    #[arg(long, env = "DATACHAT_MAX_SESSIONS", default_value_t = 10_000)]
    max_sessions: usize,
}

#[tokio::main]
async fn main() -> datachat_core::Result<()> {
    let env_file = Cli::parse().env_file;
    let loaded = load_env_from_path(&env_file);
    // the env file may set log levels and flag variables
    init_logging();
    match loaded {
        Ok(true) => info!("Loaded environment from: {}", env_file),
        Ok(false) => warn!(
            "{} not found - using system environment variables only",
            env_file
        ),
        Err(e) => {
            error!("{}", e);
            return Err(e);
        }
    }
    let cli = Cli::parse();

    let assistant_config = AssistantConfig::from_env().map_err(|e| {
        error!("Missing Azure configuration: {}", e);
        e
    })?;
    let client = AzureAssistantClient::new(&assistant_config)?;
    info!(
        "Azure OpenAI client ready ({}, api-version {})",
        assistant_config.endpoint, assistant_config.api_version
    );

    let tools = ToolRegistry::default();
    let assistant_id = ensure_assistant(
        &client,
        &assistant_config.assistant_id,
        &assistant_config.deployment_name,
        &tools,
    )
    .await?;

    let orchestrator =
        Orchestrator::new(Arc::new(client), OrchestratorConfig::from_env()).with_tools(tools);

    let web = WebConfig {
        host: cli.host,
        port: cli.port,
        logs_enabled: cli.logs,
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
        session_idle_ttl: Duration::from_secs(cli.session_idle_mins * 60),
        max_sessions: cli.max_sessions,
    };
    ChatUiServer::new(web, orchestrator, &assistant_id)
        .serve()
        .await
}
