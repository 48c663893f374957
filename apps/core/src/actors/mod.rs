pub mod llm;
pub mod messages;
pub mod retriever;
pub mod supervisor;
pub mod traits;
