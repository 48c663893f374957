use crate::actors::messages::{ActorError, AppError, RetrieverMessage};
use crate::actors::traits::RetrieverActor;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::models::MatchedDocument;
use crate::vector_store::VectorStoreClient;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// A handle to the `RetrieverActor`.
///
/// Provides a public, cloneable interface for similarity searches over the
/// hosted document store.
#[derive(Clone)]
pub struct RetrieverActorHandle {
    sender: mpsc::Sender<RetrieverMessage>,
}

impl RetrieverActorHandle {
    pub fn new(config: &Config) -> Self {
        Self::with_clients(EmbeddingClient::new(config), VectorStoreClient::new(config))
    }

    /// Constructor taking explicit clients, used by tests to point the
    /// actor at mock servers.
    pub fn with_clients(embeddings: EmbeddingClient, store: VectorStoreClient) -> Self {
        let (sender, receiver) = mpsc::channel(32);
        let actor = RetrieverActorRunner::new(receiver, embeddings, store);
        tokio::spawn(async move { actor.run().await });
        Self { sender }
    }
}

#[async_trait]
impl RetrieverActor for RetrieverActorHandle {
    async fn search(&self, query: String, limit: usize) -> Result<Vec<MatchedDocument>, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = RetrieverMessage::Search {
            query,
            limit,
            responder: send,
        };
        self.sender
            .send(msg)
            .await
            .map_err(|_| AppError::Actor(ActorError::Internal("Retriever actor closed".to_string())))?;
        recv.await
            .map_err(|_| AppError::Actor(ActorError::Internal("Retriever actor failed to respond".to_string())))?
    }
}

// --- Actor Runner (Internal Logic) ---
struct RetrieverActorRunner {
    receiver: mpsc::Receiver<RetrieverMessage>,
    embeddings: EmbeddingClient,
    store: VectorStoreClient,
    query_cache: LruCache<String, Vec<f32>>,
}

impl RetrieverActorRunner {
    const CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
        Some(size) => size,
        None => panic!("Cache size must be non-zero"),
    };

    fn new(
        receiver: mpsc::Receiver<RetrieverMessage>,
        embeddings: EmbeddingClient,
        store: VectorStoreClient,
    ) -> Self {
        Self {
            receiver,
            embeddings,
            store,
            query_cache: LruCache::new(Self::CACHE_SIZE),
        }
    }

    async fn run(mut self) {
        info!("RetrieverActor started");
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg).await;
        }
        info!("RetrieverActor stopped");
    }

    async fn handle_message(&mut self, msg: RetrieverMessage) {
        match msg {
            RetrieverMessage::Search {
                query,
                limit,
                responder,
            } => {
                let result = self.search_documents(query, limit).await;
                if responder.send(result).is_err() {
                    warn!("Failed to send search response (channel closed)");
                }
            }
        }
    }

    async fn search_documents(
        &mut self,
        query: String,
        limit: usize,
    ) -> Result<Vec<MatchedDocument>, AppError> {
        // Repeated questions in a session are common; the query embedding
        // is the expensive half, so cache it.
        let query_vec = match self.query_cache.get(&query) {
            Some(embedding) => {
                info!("Embedding cache hit for query: '{}'", query);
                embedding.clone()
            }
            None => {
                let embedding = self
                    .embeddings
                    .embed_one(&query)
                    .await
                    .map_err(|e| AppError::Actor(ActorError::RetrievalError(e.to_string())))?;
                self.query_cache.put(query.clone(), embedding.clone());
                embedding
            }
        };

        self.store
            .match_documents(&query_vec, limit)
            .await
            .map_err(|e| AppError::Actor(ActorError::RetrievalError(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_backends() -> (MockServer, MockServer) {
        let gemini = MockServer::start().await;
        let supabase = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r":embedContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": { "values": [0.5, 0.5] }
            })))
            .mount(&gemini)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/match_documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "content": "Ngành CNTT tuyển 200 chỉ tiêu năm 2024.",
                    "metadata": {
                        "id": "nganh_cntt",
                        "title": "Ngành CNTT",
                        "link": "https://example.edu.vn/cntt",
                        "favicon": "https://example.edu.vn/logo.webp",
                        "snippet": "Ngành CNTT"
                    },
                    "similarity": 0.92
                }
            ])))
            .mount(&supabase)
            .await;

        (gemini, supabase)
    }

    fn handle_for(gemini: &MockServer, supabase: &MockServer) -> RetrieverActorHandle {
        let config = temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-test")),
                ("GEMINI_API_KEY", Some("gm-test")),
                ("GEMINI_BASE_URL", Some(gemini.uri().as_str())),
                ("SUPABASE_URL", Some(supabase.uri().as_str())),
                ("SUPABASE_API_KEY", Some("sb-test")),
            ],
            || Config::from_env().unwrap(),
        );
        RetrieverActorHandle::with_clients(
            EmbeddingClient::new(&config),
            VectorStoreClient::new(&config),
        )
    }

    #[tokio::test]
    async fn search_returns_matches_with_metadata() {
        let (gemini, supabase) = mock_backends().await;
        let handle = handle_for(&gemini, &supabase);

        let matches = handle
            .search("trường có ngành IT không".to_string(), 3)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].metadata.link, "https://example.edu.vn/cntt");
    }

    #[tokio::test]
    async fn repeated_queries_reuse_the_cached_embedding() {
        let gemini = MockServer::start().await;
        let supabase = MockServer::start().await;

        // The embedding endpoint must be hit exactly once for two searches.
        Mock::given(method("POST"))
            .and(path_regex(r":embedContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": { "values": [0.1] }
            })))
            .expect(1)
            .mount(&gemini)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/match_documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(2)
            .mount(&supabase)
            .await;

        let handle = handle_for(&gemini, &supabase);
        handle.search("học phí".to_string(), 3).await.unwrap();
        handle.search("học phí".to_string(), 3).await.unwrap();
    }

    #[tokio::test]
    async fn embedding_failure_maps_to_retrieval_error() {
        let gemini = MockServer::start().await;
        let supabase = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&gemini)
            .await;

        let handle = handle_for(&gemini, &supabase);
        let err = handle.search("q".to_string(), 3).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Actor(ActorError::RetrievalError(_))
        ));
    }
}
