use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Delivery mode requested by the client for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerKind {
    /// Plain-text answer delivered in a single frame.
    Normal,
    /// Markdown answer streamed incrementally over the socket.
    Streaming,
}

impl Default for AnswerKind {
    fn default() -> Self {
        AnswerKind::Streaming
    }
}

/// A question arriving over the socket (`c_create_answer`).
///
/// Field names mirror the browser client's JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnswerRequest {
    /// Client-generated id identifying both the chat session and the
    /// socket registration to answer on.
    #[serde(rename = "sessionId")]
    #[validate(length(min = 1))]
    pub session_id: String,

    #[validate(length(min = 1, max = 4000))]
    pub question: String,

    /// Display name used to personalize answers, when the user gave one.
    pub user_name: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: AnswerKind,

    /// Chat model override; the configured default applies when absent.
    pub model: Option<String>,

    /// Client-generated id suffixing the answer event name, so concurrent
    /// questions in one session stay distinguishable.
    #[serde(rename = "emitId")]
    #[validate(length(min = 1))]
    pub emit_id: String,
}

/// The body of every `s_create_answer_*` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPayload {
    #[serde(rename = "responseObj")]
    pub response_obj: ResponseObj,
    /// `Some("DONE")` on the final frame of an answer.
    #[serde(rename = "isOver", skip_serializing_if = "Option::is_none")]
    pub is_over: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseObj {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl AnswerPayload {
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            response_obj: ResponseObj {
                content: content.into(),
                kind: "answer".to_string(),
            },
            is_over: None,
        }
    }

    pub fn done(content: impl Into<String>) -> Self {
        Self {
            response_obj: ResponseObj {
                content: content.into(),
                kind: "answer".to_string(),
            },
            is_over: Some("DONE".to_string()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response_obj: ResponseObj {
                content: message.into(),
                kind: "error".to_string(),
            },
            is_over: Some("DONE".to_string()),
        }
    }
}

/// Provenance attached to every ingested document and returned with
/// retrieval matches so answers can cite their sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMetadata {
    pub id: String,
    pub title: String,
    pub link: String,
    pub favicon: String,
    pub snippet: String,
}

/// A similarity-search hit from the hosted vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedDocument {
    pub content: String,
    pub metadata: DocMetadata,
    pub similarity: f32,
}

/// Represents a chat session. Sessions are created implicitly the first
/// time a client-generated id shows up.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub id: String,
    pub user_name: Option<String>,
    pub created_at: i64,
}

/// Represents a single message within a chat session.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_request_deserializes_client_payload() {
        let raw = r#"{
            "sessionId": "abc-123",
            "question": "Trường có ngành CNTT không?",
            "user_name": "Phương",
            "type": "STREAMING",
            "emitId": "e-1"
        }"#;
        let req: AnswerRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.session_id, "abc-123");
        assert_eq!(req.kind, AnswerKind::Streaming);
        assert_eq!(req.user_name.as_deref(), Some("Phương"));
        assert!(req.model.is_none());
    }

    #[test]
    fn missing_type_defaults_to_streaming() {
        let raw = r#"{"sessionId": "s", "question": "q", "emitId": "e"}"#;
        let req: AnswerRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.kind, AnswerKind::Streaming);
    }

    #[test]
    fn done_payload_serializes_is_over_marker() {
        let json = serde_json::to_value(AnswerPayload::done("xin chào")).unwrap();
        assert_eq!(json["isOver"], "DONE");
        assert_eq!(json["responseObj"]["type"], "answer");
    }

    #[test]
    fn partial_payload_omits_is_over() {
        let json = serde_json::to_value(AnswerPayload::partial("...")).unwrap();
        assert!(json.get("isOver").is_none());
    }

    #[test]
    fn validation_rejects_empty_question() {
        let req = AnswerRequest {
            session_id: "s".into(),
            question: String::new(),
            user_name: None,
            kind: AnswerKind::Normal,
            model: None,
            emit_id: "e".into(),
        };
        assert!(req.validate().is_err());
    }
}
