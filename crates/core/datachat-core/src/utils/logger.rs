//! Logging setup and in-process log fan-out

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// A log record republished to in-process subscribers
#[derive(Clone, Debug, Serialize)]
pub struct LogEvent {
    /// Level name, e.g. `INFO`
    pub level: String,
    /// Module path that emitted the event
    pub target: String,
    /// Formatted message
    pub message: String,
    /// Source file
    pub file: Option<String>,
    /// Source line
    pub line: Option<u32>,
    /// RFC 3339 timestamp
    pub time: String,
}

static LOG_TX: OnceCell<broadcast::Sender<LogEvent>> = OnceCell::new();

/// Receive log events emitted after this call; `None` before `init_logging`
pub fn subscribe_logs() -> Option<broadcast::Receiver<LogEvent>> {
    LOG_TX.get().map(|tx| tx.subscribe())
}

struct BroadcastLayer {
    tx: broadcast::Sender<LogEvent>,
}

impl<S> Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        use tracing::field::{Field, Visit};
        struct MsgVisitor {
            msg: String,
        }
        impl Visit for MsgVisitor {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.msg = format!("{:?}", value);
                }
            }
            fn record_str(&mut self, field: &Field, value: &str) {
                if field.name() == "message" {
                    self.msg = value.to_string();
                }
            }
        }
        // no subscribers, nothing to format
        if self.tx.receiver_count() == 0 {
            return;
        }
        let mut visitor = MsgVisitor { msg: String::new() };
        event.record(&mut visitor);
        let meta = event.metadata();
        let ev = LogEvent {
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: visitor.msg,
            file: meta.file().map(|s| s.to_string()),
            line: meta.line(),
            time: chrono::Utc::now().to_rfc3339(),
        };
        let _ = self.tx.send(ev);
    }
}

/// Initialize the global logging system
///
/// `RUST_LOG` wins over `DATACHAT_LOG_LEVEL`; both default to `info`.
pub fn init_logging() {
    let level = std::env::var("DATACHAT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    let tx = LOG_TX
        .get_or_init(|| {
            let (tx, _rx) = broadcast::channel(1024);
            tx
        })
        .clone();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(BroadcastLayer { tx })
        .try_init();
}

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"sk-[A-Za-z0-9]{20,}", "[REDACTED_KEY]"),
        (r"(?i)api[_-]?key\s*[:=]\s*[A-Za-z0-9_-]{12,}", "api_key=[REDACTED_KEY]"),
        (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED_KEY]"),
        (r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}", "[REDACTED_EMAIL]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Mask API keys and e-mail addresses before a message leaves the process
pub fn scrub_secrets(message: &str) -> String {
    let mut out: String = message.chars().take(2000).collect();
    for (re, replacement) in SECRET_PATTERNS.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}
