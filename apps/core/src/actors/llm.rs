use crate::actors::messages::{AppError, LlmMessage};
use crate::actors::traits::LlmActor;
use crate::config::Config;
use crate::prompt::ChatTurn;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::info;

/// A handle to the `LlmActor`.
///
/// This struct provides a public, cloneable interface for sending messages to the
/// running LLM actor. It abstracts away the `mpsc::Sender`.
#[derive(Clone)]
pub struct LlmActorHandle {
    sender: mpsc::Sender<LlmMessage>,
}

impl LlmActorHandle {
    /// Creates a new `LlmActor` and returns a handle to it.
    ///
    /// This will spawn the `LlmActorRunner` in a new Tokio task.
    pub fn new(config: Arc<Config>) -> Self {
        let (sender, receiver) = mpsc::channel(32);
        let actor = LlmActorRunner::new(receiver, config);
        tokio::spawn(async move { actor.run().await });
        Self { sender }
    }
}

#[async_trait]
impl LlmActor for LlmActorHandle {
    async fn generate(&self, messages: Vec<ChatTurn>, model: String) -> Result<String, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = LlmMessage::Generate {
            messages,
            model,
            responder: send,
        };

        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Internal(format!("LLM actor closed: {}", e)))?;
        timeout(Duration::from_secs(150), recv)
            .await?
            .map_err(|e| AppError::Internal(format!("LLM actor dropped responder: {}", e)))?
    }

    async fn stream_generate(
        &self,
        messages: Vec<ChatTurn>,
        model: String,
        chunk_sender: mpsc::Sender<Result<String, AppError>>,
    ) -> Result<(), AppError> {
        let (send, recv) = oneshot::channel();
        let msg = LlmMessage::StreamGenerate {
            messages,
            model,
            chunk_sender,
            responder: send,
        };

        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Internal(format!("LLM actor closed: {}", e)))?;
        timeout(Duration::from_secs(300), recv) // Longer timeout for streaming
            .await?
            .map_err(|e| AppError::Internal(format!("LLM actor dropped responder: {}", e)))?
    }
}

// --- Constants ---
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);
const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

// --- Actor Runner (Internal Logic) ---
struct LlmActorRunner {
    receiver: mpsc::Receiver<LlmMessage>,
    client: Client,
    config: Arc<Config>,
}

impl LlmActorRunner {
    fn new(receiver: mpsc::Receiver<LlmMessage>, config: Arc<Config>) -> Self {
        Self {
            receiver,
            client: Client::new(),
            config,
        }
    }

    async fn run(mut self) {
        info!("LlmActor started");

        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg).await;
        }

        info!("LlmActor stopped");
    }

    async fn handle_message(&mut self, msg: LlmMessage) {
        match msg {
            LlmMessage::Generate {
                messages,
                model,
                responder,
            } => {
                let result = self.generate_completion(messages, &model).await;
                let _ = responder.send(result);
            }
            LlmMessage::StreamGenerate {
                messages,
                model,
                chunk_sender,
                responder,
            } => {
                let result = self.stream_completion(messages, &model, chunk_sender).await;
                let _ = responder.send(result);
            }
        }
    }

    fn build_request(
        &self,
        model: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::RequestBuilder, AppError> {
        let (base_url, api_key) = self.config.provider_for_model(model)?;
        Ok(self
            .client
            .post(format!("{}/chat/completions", base_url))
            .bearer_auth(api_key)
            .json(payload))
    }

    async fn generate_completion(
        &self,
        messages: Vec<ChatTurn>,
        model: &str,
    ) -> Result<String, AppError> {
        info!("LLM generating with model {}", model);

        let payload = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        let request_future = self.build_request(model, &payload)?.send();
        let res = timeout(COMPLETION_TIMEOUT, request_future).await??;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Completion request failed with status {}: {}",
                status, body
            )));
        }

        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed completion response: {}", e)))?;

        Ok(json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }

    async fn stream_completion(
        &self,
        messages: Vec<ChatTurn>,
        model: &str,
        chunk_sender: mpsc::Sender<Result<String, AppError>>,
    ) -> Result<(), AppError> {
        info!("LLM streaming with model {}", model);

        let payload = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });

        let request_future = self.build_request(model, &payload)?.send();
        let res = timeout(COMPLETION_TIMEOUT, request_future).await??;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Completion request failed with status {}: {}",
                status, body
            )));
        }

        let mut stream = res.bytes_stream();
        // SSE events can straddle network chunks; carry the incomplete
        // tail over to the next read.
        let mut pending = String::new();

        loop {
            let item = match timeout(STREAM_CHUNK_TIMEOUT, stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    return Err(AppError::Timeout(
                        "Timed out waiting for the next completion chunk".to_string(),
                    ))
                }
            };

            let bytes = item.map_err(AppError::from)?;
            pending.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = pending.find('\n') {
                let line = pending[..newline].trim().to_string();
                pending.drain(..=newline);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(());
                }
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                    if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                        if chunk_sender.send(Ok(content.to_string())).await.is_err() {
                            // Receiver hung up; nobody is listening anymore.
                            return Ok(());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerKind;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> Arc<Config> {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-test")),
                ("OPENAI_BASE_URL", Some(base_url)),
                ("GROQ_API_KEY", Some("gq-test")),
                ("GROQ_BASE_URL", Some(base_url)),
                ("GEMINI_API_KEY", Some("gm-test")),
                ("SUPABASE_URL", Some("https://project.supabase.co")),
                ("SUPABASE_API_KEY", Some("sb-test")),
            ],
            || Arc::new(Config::from_env().unwrap()),
        )
    }

    async fn setup_test_actor(server_url: &str) -> LlmActorHandle {
        let (sender, receiver) = mpsc::channel(32);
        let mut actor = LlmActorRunner::new(receiver, test_config(server_url));

        tokio::spawn(async move {
            while let Some(msg) = actor.receiver.recv().await {
                actor.handle_message(msg).await;
            }
        });

        LlmActorHandle { sender }
    }

    fn question() -> Vec<ChatTurn> {
        let req = crate::models::AnswerRequest {
            session_id: "s1".into(),
            question: "Trường có ngành IT không?".into(),
            user_name: None,
            kind: AnswerKind::Normal,
            model: None,
            emit_id: "e1".into(),
        };
        crate::prompt::build_chat_messages(&req, "", &[], "tuyensinh@example.edu.vn")
    }

    #[tokio::test]
    async fn generate_returns_message_content() {
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(&mock_server.uri()).await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": "Có, trường có ngành CNTT." },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&mock_server)
            .await;

        let result = handle
            .generate(question(), "gpt-3.5-turbo-1106".to_string())
            .await;
        assert_eq!(result.unwrap(), "Có, trường có ngành CNTT.");
    }

    #[tokio::test]
    async fn server_error_is_surfaced_with_body() {
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(&mock_server.uri()).await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let result = handle
            .generate(question(), "gpt-3.5-turbo-1106".to_string())
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("500"));
        assert!(err.contains("Internal Server Error"));
    }

    #[tokio::test]
    async fn stream_generate_forwards_delta_fragments() {
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(&mock_server.uri()).await;

        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Xin \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"chào \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"bạn\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"),
            )
            .mount(&mock_server)
            .await;

        let (chunk_tx, mut chunk_rx) = mpsc::channel(32);
        let stream_result = handle
            .stream_generate(question(), "mixtral-8x7b-32768".to_string(), chunk_tx)
            .await;
        assert!(stream_result.is_ok());

        let mut collected = String::new();
        while let Some(chunk) = chunk_rx.recv().await {
            collected.push_str(&chunk.unwrap());
        }
        assert_eq!(collected, "Xin chào bạn");
    }

    #[tokio::test]
    async fn stream_stops_at_done_marker() {
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(&mock_server.uri()).await;

        // Content after [DONE] must not be forwarded.
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"một\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"hai\"}}]}\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"),
            )
            .mount(&mock_server)
            .await;

        let (chunk_tx, mut chunk_rx) = mpsc::channel(32);
        handle
            .stream_generate(question(), "gpt-3.5-turbo-1106".to_string(), chunk_tx)
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(chunk) = chunk_rx.recv().await {
            collected.push_str(&chunk.unwrap());
        }
        assert_eq!(collected, "một");
    }
}
