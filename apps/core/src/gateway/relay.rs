//! Streaming answer relay.
//!
//! The completion API produces deltas far faster than the browser needs
//! repaints, so the relay accumulates them and re-emits the running text
//! to the session's socket on a fixed 100 ms cadence. Each frame carries
//! the full accumulated answer; the client simply renders the latest
//! frame, which makes dropped or reordered frames harmless. The final
//! frame carries the `DONE` marker.

use crate::gateway::socket::{ServerEvent, SocketRegistry};
use crate::models::AnswerPayload;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// A running relay for one answer. Dropping it without calling
/// [`finish`](Self::finish) or [`abort`](Self::abort) leaks the ticker
/// task, so every code path must consume it.
pub struct StreamRelay {
    buffer: Arc<Mutex<String>>,
    registry: SocketRegistry,
    session_id: String,
    emit_id: String,
    ticker: JoinHandle<()>,
}

impl StreamRelay {
    /// Starts the flush ticker for the exchange `emit_id` of `session_id`.
    pub fn start(registry: SocketRegistry, session_id: &str, emit_id: &str) -> Self {
        let buffer = Arc::new(Mutex::new(String::new()));

        let ticker = tokio::spawn({
            let buffer = buffer.clone();
            let registry = registry.clone();
            let session_id = session_id.to_string();
            let emit_id = emit_id.to_string();
            async move {
                let mut interval = tokio::time::interval(FLUSH_INTERVAL);
                // The first tick of a tokio interval fires immediately;
                // swallow it so the cadence starts one period in.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let content = buffer.lock().await.clone();
                    registry
                        .emit(&session_id, ServerEvent::answer(&emit_id, AnswerPayload::partial(content)))
                        .await;
                }
            }
        });

        Self {
            buffer,
            registry,
            session_id: session_id.to_string(),
            emit_id: emit_id.to_string(),
            ticker,
        }
    }

    /// Appends one delta fragment to the accumulated answer.
    pub async fn push(&self, token: &str) {
        if token.is_empty() {
            return;
        }
        self.buffer.lock().await.push_str(token);
    }

    /// Stops the ticker, emits the final `DONE` frame and returns the full
    /// accumulated answer.
    pub async fn finish(self) -> String {
        self.ticker.abort();
        let content = self.buffer.lock().await.clone();
        self.registry
            .emit(
                &self.session_id,
                ServerEvent::answer(&self.emit_id, AnswerPayload::done(content.clone())),
            )
            .await;
        content
    }

    /// Stops the ticker without a `DONE` frame. Used when generation fails
    /// and an error frame will close the exchange instead. Returns whatever
    /// text had accumulated.
    pub async fn abort(self) -> String {
        self.ticker.abort();
        self.buffer.lock().await.clone()
    }
}
