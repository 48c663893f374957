use crate::models::{AnswerKind, AnswerRequest, MatchedDocument};
use serde::{Deserialize, Serialize};

/// One turn of the chat-completions payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// The assistant persona shared by every answer.
const ROLE_PREAMBLE: &str = "You are AdmiBot, the admissions advisor of the university. \
You help prospective students and their families with questions about majors, tuition, \
admission criteria, deadlines and campus life.";

/// Builds the full message list for one question: persona + rules as the
/// system turn, the running transcript as the user turn, and a short
/// assistant primer fixing the output language and format.
pub fn build_chat_messages(
    req: &AnswerRequest,
    transcript: &str,
    context: &[MatchedDocument],
    contact_email: &str,
) -> Vec<ChatTurn> {
    let mut rules = String::new();
    rules.push_str(ROLE_PREAMBLE);
    rules.push_str("\nPlease answer the question, and make sure you follow ALL of the rules below:\n");
    rules.push_str(&format!(
        "- Here is query: {}, respond back with an answer for user is as long as possible. \
You can based on history chat that human provided below\n",
        req.question
    ));
    rules.push_str(&format!(
        "- Don't try to make up an answer. If you really don't know the answer, say \
\"I'm sorry, I don't know the answer to that.\" then direct the questioner to email {} to assist.\n",
        contact_email
    ));
    if let Some(name) = req.user_name.as_deref().filter(|n| !n.is_empty()) {
        rules.push_str(&format!(
            "- Please mention the user's name when chatting. The user's name is {}\n",
            name
        ));
    }
    rules.push_str(
        "- Answer questions in a helpful manner that straight to the point, with clear \
structure & all relevant information that might help users answer the question\n\
- Don't answer in letter form, don't be too formal, try to answer normal chat text type \
as if you were chatting to a friend. You can use icons to show the friendliness\n",
    );
    match req.kind {
        AnswerKind::Streaming => rules.push_str(
            "- Anwser should be formatted in Markdown (IMPORTANT)\n\
- If there are relevant markdown syntax have type: IMAGES, VIDEO, LINKS, TABLE \
(keep markdown syntax in Table), CODE, ... You must include them as part of the answer \
and must keep the markdown syntax\n",
        ),
        AnswerKind::Normal => {
            rules.push_str("- Please return an answer in plain text NOT MARKDOWN SYNTAX\n")
        }
    }
    rules.push_str(
        "- Please answer in VIETNAMESE. Double check the spelling to see if it is correct \
whether you returned the answer in Vietnamese\n",
    );

    if !context.is_empty() {
        rules.push_str("\nAnswer based on the documents below when they are relevant:\n");
        rules.push_str(&render_context(context));
    }

    let primer_format = match req.kind {
        AnswerKind::Streaming => "FORMATTED IN MARKDOWN",
        AnswerKind::Normal => "FORMATTED IN PLAIN TEXT",
    };

    vec![
        ChatTurn::system(rules),
        ChatTurn::user(format!("History chat: {}", transcript)),
        ChatTurn::assistant(format!("(VIETNAMESE ANSWER {})", primer_format)),
    ]
}

/// Renders retrieval matches into the context block, each chunk followed
/// by its source so the model can cite links in markdown answers.
fn render_context(matches: &[MatchedDocument]) -> String {
    matches
        .iter()
        .map(|doc| {
            format!(
                "{}\n(Nguồn: [{}]({}))",
                doc.content.trim(),
                doc.metadata.title,
                doc.metadata.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}
