//! Google Generative Language embeddings client.
//!
//! Every chunk stored in the vector store and every retrieval query goes
//! through `embedding-001` (768 dimensions). Requests are plain REST calls;
//! batches run in small concurrent groups, mirroring how the ingestion
//! pipeline has always paced its upstream calls.

use crate::config::Config;
use crate::error::AppError;
use futures::future::try_join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Dimensionality of `embedding-001` vectors.
pub const EMBEDDING_DIMS: usize = 768;

/// How many embedding requests run concurrently during batch work.
const BATCH_GROUP_SIZE: usize = 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Clone)]
pub struct EmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.gemini_base_url.clone(),
            api_key: config.gemini_api_key.clone(),
            model: config.embedding_model.clone(),
        }
    }

    /// Embeds a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let payload = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] }
        });

        let res = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Embedding request failed with status {}: {}",
                status, body
            )));
        }

        let parsed: EmbedContentResponse = res
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed embedding response: {}", e)))?;
        Ok(parsed.embedding.values)
    }

    /// Embeds a batch, preserving input order. Texts are processed in
    /// groups of five concurrent requests; a failure anywhere fails the
    /// whole batch (ingestion re-runs are idempotent upserts).
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(BATCH_GROUP_SIZE) {
            let batch = try_join_all(group.iter().map(|text| self.embed_one(text))).await?;
            embeddings.extend(batch);
        }
        info!("Embedded {} texts", embeddings.len());
        Ok(embeddings)
    }
}
