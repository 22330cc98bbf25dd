use axum::response::sse::{Event, KeepAlive, Sse};
use datachat_core::{scrub_secrets, subscribe_logs, LogEvent};
use futures_util::stream::{BoxStream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

fn to_event(mut ev: LogEvent) -> Event {
    ev.message = scrub_secrets(&ev.message);
    let data = serde_json::to_string(&ev).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

/// Live log lines with secrets scrubbed
pub async fn logs_sse() -> Sse<BoxStream<'static, std::result::Result<Event, Infallible>>> {
    let rx = match subscribe_logs() {
        Some(rx) => rx,
        None => {
            let (tx, rx) = tokio::sync::broadcast::channel::<LogEvent>(1);
            let _ = tx.send(LogEvent {
                level: "INFO".into(),
                target: "init".into(),
                message: "logging not initialized".into(),
                file: None,
                line: None,
                time: chrono::Utc::now().to_rfc3339(),
            });
            rx
        }
    };

    let stream = BroadcastStream::new(rx)
        .filter_map(|item| async move { item.ok().map(|ev| Ok(to_event(ev))) })
        .boxed();
    Sse::new(stream).keep_alive(KeepAlive::default())
}
