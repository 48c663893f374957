use crate::actors::messages::AppError;
use crate::models::MatchedDocument;
use crate::prompt::ChatTurn;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Defines the public interface for the LLM actor.
///
/// Abstracts the hosted chat-completion backend so the supervisor can be
/// tested against a scripted double.
#[async_trait]
pub trait LlmActor: Send + Sync + 'static {
    /// Generates a complete answer for the given message list.
    async fn generate(&self, messages: Vec<ChatTurn>, model: String) -> Result<String, AppError>;

    /// Generates a streamed answer, sending delta fragments as they arrive.
    async fn stream_generate(
        &self,
        messages: Vec<ChatTurn>,
        model: String,
        chunk_sender: mpsc::Sender<Result<String, AppError>>,
    ) -> Result<(), AppError>;
}

/// Defines the public interface for the retriever actor backing
/// document-grounded answers.
#[async_trait]
pub trait RetrieverActor: Send + Sync + 'static {
    /// Returns the most similar ingested chunks for a query.
    async fn search(&self, query: String, limit: usize) -> Result<Vec<MatchedDocument>, AppError>;
}
