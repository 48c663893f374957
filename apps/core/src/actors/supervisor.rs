use crate::actors::llm::LlmActorHandle;
use crate::actors::messages::{AppError, SupervisorMessage};
use crate::actors::retriever::RetrieverActorHandle;
use crate::actors::traits::{LlmActor, RetrieverActor};
use crate::config::Config;
use crate::database;
use crate::gateway::relay::StreamRelay;
use crate::gateway::socket::{ServerEvent, SocketRegistry};
use crate::models::{AnswerKind, AnswerPayload, AnswerRequest};
use crate::prompt;
use crate::rate_limiter::RateLimiter;
use sqlx::sqlite::SqlitePool;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};
use tracing::{error, info, instrument};

/// How many retrieval matches back a document-grounded answer.
const CONTEXT_MATCH_COUNT: usize = 3;

/// A handle to the `Supervisor`.
///
/// This is the primary entry point for answering questions. It orchestrates
/// the `LlmActor` and `RetrieverActor` and owns delivery over the socket
/// registry.
#[derive(Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<SupervisorMessage>,
}

impl SupervisorHandle {
    /// Creates the production supervisor with real LLM and retriever actors.
    pub fn new(config: Arc<Config>, pool: SqlitePool, registry: SocketRegistry) -> Self {
        let llm = Arc::new(LlmActorHandle::new(config.clone()));
        let retriever = Arc::new(RetrieverActorHandle::new(&config));
        Self::with_actors(config, pool, registry, llm, retriever)
    }

    /// Creates a supervisor over explicit actor implementations. Tests
    /// inject scripted doubles through this.
    pub fn with_actors<L, R>(
        config: Arc<Config>,
        pool: SqlitePool,
        registry: SocketRegistry,
        llm: Arc<L>,
        retriever: Arc<R>,
    ) -> Self
    where
        L: LlmActor,
        R: RetrieverActor,
    {
        let (sender, receiver) = mpsc::channel(32);
        let runner = SupervisorRunner {
            receiver,
            shared: Arc::new(SupervisorShared {
                llm,
                retriever,
                pool,
                registry,
                config,
                limiter: Mutex::new(RateLimiter::per_session_default()),
            }),
        };
        tokio::spawn(async move { runner.run().await });
        Self { sender }
    }

    /// Answers one question. The answer is also delivered over the socket
    /// registered for the request's session id; the returned string is the
    /// full text as persisted.
    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    pub async fn process_question(&self, request: AnswerRequest) -> Result<String, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = SupervisorMessage::ProcessQuestion {
            request,
            responder: send,
        };
        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Internal(format!("Supervisor closed: {}", e)))?;
        // Streaming answers can legitimately run for minutes.
        timeout(Duration::from_secs(330), recv)
            .await?
            .map_err(|e| AppError::Internal(format!("Supervisor dropped responder: {}", e)))?
    }
}

// --- Actor Runner ---

/// State shared by every in-flight question.
struct SupervisorShared<L, R>
where
    L: LlmActor,
    R: RetrieverActor,
{
    llm: Arc<L>,
    retriever: Arc<R>,
    pool: SqlitePool,
    registry: SocketRegistry,
    config: Arc<Config>,
    limiter: Mutex<RateLimiter>,
}

struct SupervisorRunner<L, R>
where
    L: LlmActor,
    R: RetrieverActor,
{
    receiver: mpsc::Receiver<SupervisorMessage>,
    shared: Arc<SupervisorShared<L, R>>,
}

impl<L, R> SupervisorRunner<L, R>
where
    L: LlmActor,
    R: RetrieverActor,
{
    async fn run(mut self) {
        info!("Supervisor started");
        // Questions from different sessions must not queue behind one
        // long-running stream, so each message gets its own task.
        while let Some(msg) = self.receiver.recv().await {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                match msg {
                    SupervisorMessage::ProcessQuestion { request, responder } => {
                        let result = handle_question(&shared, request).await;
                        if let Err(e) = &result {
                            error!("Error processing question: {:?}", e);
                        }
                        let _ = responder.send(result);
                    }
                }
            });
        }
        info!("Supervisor stopped");
    }
}

async fn handle_question<L, R>(
    shared: &SupervisorShared<L, R>,
    req: AnswerRequest,
) -> Result<String, AppError>
where
    L: LlmActor,
    R: RetrieverActor,
{
    info!("Supervisor received question: {}", req.question);

    let allowed = {
        let mut limiter = shared
            .limiter
            .lock()
            .map_err(|_| AppError::Internal("Rate limiter lock poisoned".to_string()))?;
        limiter.check(&req.session_id)
    };
    if !allowed {
        shared
            .registry
            .emit(
                &req.session_id,
                ServerEvent::answer(
                    &req.emit_id,
                    AnswerPayload::error("Bạn đang gửi câu hỏi quá nhanh, vui lòng chờ một lát rồi thử lại nhé!"),
                ),
            )
            .await;
        return Err(AppError::RateLimited);
    }

    // --- Chat history ---
    database::ensure_session(&shared.pool, &req.session_id, req.user_name.as_deref()).await?;
    database::add_message(&shared.pool, &req.session_id, "user", &req.question).await?;
    let transcript = database::history_as_transcript(&shared.pool, &req.session_id).await?;

    // --- Document context ---
    // Retrieval going down degrades the answer, it must not block it.
    let context = match shared
        .retriever
        .search(req.question.clone(), CONTEXT_MATCH_COUNT)
        .await
    {
        Ok(matches) => {
            info!("Retrieved {} context documents", matches.len());
            matches
        }
        Err(e) => {
            error!("Context retrieval failed, answering without it: {}", e);
            Vec::new()
        }
    };

    let messages = prompt::build_chat_messages(&req, &transcript, &context, &shared.config.contact_email);
    let model = req
        .model
        .clone()
        .unwrap_or_else(|| shared.config.default_chat_model.clone());

    // --- Generation & delivery ---
    let full_answer = match req.kind {
        AnswerKind::Streaming => {
            let relay = StreamRelay::start(shared.registry.clone(), &req.session_id, &req.emit_id);

            let (chunk_tx, mut chunk_rx) = mpsc::channel(32);
            let llm = shared.llm.clone();
            let generation =
                tokio::spawn(async move { llm.stream_generate(messages, model, chunk_tx).await });

            while let Some(result) = chunk_rx.recv().await {
                match result {
                    Ok(token) => relay.push(&token).await,
                    Err(e) => error!("Streaming error: {}", e),
                }
            }

            let generation_result = generation
                .await
                .map_err(|e| AppError::Internal(format!("Generation task panicked: {}", e)))?;

            match generation_result {
                Ok(()) => relay.finish().await,
                Err(e) => {
                    // The error frame from the gateway will close the
                    // exchange; do not send a DONE frame for a dead stream.
                    relay.abort().await;
                    return Err(e);
                }
            }
        }
        AnswerKind::Normal => {
            let answer = shared.llm.generate(messages, model).await?;
            shared
                .registry
                .emit(
                    &req.session_id,
                    ServerEvent::answer(&req.emit_id, AnswerPayload::done(answer.clone())),
                )
                .await;
            answer
        }
    };

    database::add_message(&shared.pool, &req.session_id, "assistant", &full_answer).await?;
    Ok(full_answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_db;
    use crate::models::{DocMetadata, MatchedDocument};
    use crate::prompt::ChatTurn;
    use async_trait::async_trait;

    // --- Mock Actors ---

    #[derive(Clone)]
    struct MockLlmActor {
        response: Result<String, AppError>,
    }

    #[async_trait]
    impl LlmActor for MockLlmActor {
        async fn generate(
            &self,
            _messages: Vec<ChatTurn>,
            _model: String,
        ) -> Result<String, AppError> {
            self.response.clone()
        }

        async fn stream_generate(
            &self,
            _messages: Vec<ChatTurn>,
            _model: String,
            chunk_sender: mpsc::Sender<Result<String, AppError>>,
        ) -> Result<(), AppError> {
            match &self.response {
                Ok(text) => {
                    // Stream word by word like a real delta sequence.
                    for word in text.split_inclusive(' ') {
                        let _ = chunk_sender.send(Ok(word.to_string())).await;
                    }
                    Ok(())
                }
                Err(e) => Err(e.clone()),
            }
        }
    }

    struct MockRetriever {
        matches: Result<Vec<MatchedDocument>, AppError>,
    }

    #[async_trait]
    impl RetrieverActor for MockRetriever {
        async fn search(
            &self,
            _query: String,
            _limit: usize,
        ) -> Result<Vec<MatchedDocument>, AppError> {
            match &self.matches {
                Ok(m) => Ok(m.clone()),
                Err(e) => Err(e.clone()),
            }
        }
    }

    fn test_config() -> Arc<Config> {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-test")),
                ("GEMINI_API_KEY", Some("gm-test")),
                ("SUPABASE_URL", Some("https://project.supabase.co")),
                ("SUPABASE_API_KEY", Some("sb-test")),
            ],
            || Arc::new(Config::from_env().unwrap()),
        )
    }

    fn sample_match() -> MatchedDocument {
        MatchedDocument {
            content: "Ngành CNTT tuyển 200 chỉ tiêu.".into(),
            metadata: DocMetadata {
                id: "nganh_cntt".into(),
                title: "Ngành CNTT".into(),
                link: "https://example.edu.vn/cntt".into(),
                favicon: "https://example.edu.vn/logo.webp".into(),
                snippet: "Ngành CNTT".into(),
            },
            similarity: 0.9,
        }
    }

    async fn setup(
        llm_response: Result<String, AppError>,
        matches: Result<Vec<MatchedDocument>, AppError>,
    ) -> (SupervisorHandle, SqlitePool, SocketRegistry) {
        let pool = init_db(Some(":memory:")).await.unwrap();
        let registry = SocketRegistry::new();
        let handle = SupervisorHandle::with_actors(
            test_config(),
            pool.clone(),
            registry.clone(),
            Arc::new(MockLlmActor { response: llm_response }),
            Arc::new(MockRetriever { matches }),
        );
        (handle, pool, registry)
    }

    fn request(kind: AnswerKind) -> AnswerRequest {
        AnswerRequest {
            session_id: "session-test".into(),
            question: "Trường có ngành IT không?".into(),
            user_name: Some("Phương".into()),
            kind,
            model: None,
            emit_id: "emit-1".into(),
        }
    }

    #[tokio::test]
    async fn nominal_question_is_answered_and_persisted() {
        let (handle, pool, registry) = setup(
            Ok("Có, trường có ngành CNTT nhé!".to_string()),
            Ok(vec![sample_match()]),
        ).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("session-test", tx).await;

        let answer = handle.process_question(request(AnswerKind::Streaming)).await.unwrap();
        assert_eq!(answer, "Có, trường có ngành CNTT nhé!");

        // Both sides of the exchange are stored.
        let messages: Vec<(String, String)> =
            sqlx::query_as("SELECT role, content FROM messages WHERE session_id = ? ORDER BY id")
                .bind("session-test")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, "user");
        assert_eq!(messages[1].0, "assistant");
        assert_eq!(messages[1].1, "Có, trường có ngành CNTT nhé!");

        // The socket got frames, ending with the DONE frame.
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let last = last.expect("at least one frame must have been emitted");
        assert_eq!(last.event, "s_create_answer_emit-1");
        assert_eq!(last.data["isOver"], "DONE");
        assert_eq!(last.data["responseObj"]["content"], "Có, trường có ngành CNTT nhé!");
    }

    #[tokio::test]
    async fn llm_error_propagates_and_skips_assistant_row() {
        let (handle, pool, _registry) = setup(
            Err(AppError::Upstream("completion failed with status 500".into())),
            Ok(vec![]),
        ).await;

        let result = handle.process_question(request(AnswerKind::Streaming)).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE role = 'assistant'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn retrieval_failure_still_answers() {
        let (handle, _pool, _registry) = setup(
            Ok("Vẫn trả lời được.".to_string()),
            Err(AppError::Upstream("vector store down".into())),
        ).await;

        let answer = handle.process_question(request(AnswerKind::Normal)).await.unwrap();
        assert_eq!(answer, "Vẫn trả lời được.");
    }

    #[tokio::test]
    async fn normal_mode_emits_a_single_done_frame() {
        let (handle, _pool, registry) = setup(Ok("Câu trả lời.".to_string()), Ok(vec![])).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("session-test", tx).await;

        handle.process_question(request(AnswerKind::Normal)).await.unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.data["isOver"], "DONE");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rate_limit_rejects_with_error_frame() {
        let (handle, _pool, registry) = setup(Ok("ok".to_string()), Ok(vec![])).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("session-test", tx).await;

        // The default window allows 30 answers per minute.
        for _ in 0..30 {
            handle.process_question(request(AnswerKind::Normal)).await.unwrap();
        }
        let result = handle.process_question(request(AnswerKind::Normal)).await;
        assert!(matches!(result, Err(AppError::RateLimited)));

        let mut saw_error_frame = false;
        while let Ok(event) = rx.try_recv() {
            if event.data["responseObj"]["type"] == "error" {
                saw_error_frame = true;
            }
        }
        assert!(saw_error_frame);
    }
}
