use crate::models::MatchedDocument;
use crate::prompt::ChatTurn;
use serde::Serialize;
use tokio::sync::oneshot;

/// Defines errors that can occur within the actor system.
#[derive(Debug, thiserror::Error, Serialize, Clone)]
pub enum ActorError {
    /// An error originating from the LLM actor.
    #[error("LLM request failed: {0}")]
    LlmError(String),
    /// An error originating from the retriever actor.
    #[error("Retrieval failed: {0}")]
    RetrievalError(String),
    /// A generic internal error within an actor.
    #[error("Internal system error: {0}")]
    Internal(String),
    /// An error indicating that an actor operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<tokio::time::error::Elapsed> for ActorError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ActorError::Timeout(format!("Actor operation timed out: {}", err))
    }
}

// Re-export AppError for convenience
pub use crate::error::AppError;

/// Messages that can be sent to the `LlmActor`.
#[derive(Debug)]
pub enum LlmMessage {
    /// A request for a complete answer in one response.
    Generate {
        messages: Vec<ChatTurn>,
        model: String,
        /// A channel to send the final answer text back.
        responder: oneshot::Sender<Result<String, AppError>>,
    },
    /// A request for a streamed answer.
    StreamGenerate {
        messages: Vec<ChatTurn>,
        model: String,
        /// A channel to send each delta fragment back as it arrives.
        chunk_sender: tokio::sync::mpsc::Sender<Result<String, AppError>>,
        /// A channel to signal completion or an error for the whole stream.
        responder: oneshot::Sender<Result<(), AppError>>,
    },
}

/// Messages that can be sent to the `RetrieverActor`.
#[derive(Debug)]
pub enum RetrieverMessage {
    /// A similarity search over the hosted document store.
    Search {
        query: String,
        /// The maximum number of matches to return.
        limit: usize,
        responder: oneshot::Sender<Result<Vec<MatchedDocument>, AppError>>,
    },
}

/// Messages that can be sent to the `Supervisor`.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// A question from a connected client, to be answered over its socket.
    ProcessQuestion {
        request: crate::models::AnswerRequest,
        /// A channel to send the final assistant answer back.
        responder: oneshot::Sender<Result<String, AppError>>,
    },
}
