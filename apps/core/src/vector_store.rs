//! Supabase vector store client.
//!
//! The `documents` table (pgvector column + the `match_documents` RPC) is
//! hosted; this client only speaks PostgREST. Indexing, consistency and
//! similarity ranking all stay on the Supabase side.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{DocMetadata, MatchedDocument};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One row destined for the hosted `documents` table.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRow {
    pub content: String,
    pub metadata: DocMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    content: String,
    metadata: DocMetadata,
    similarity: f32,
}

#[derive(Clone)]
pub struct VectorStoreClient {
    http: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl VectorStoreClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_api_key.clone(),
            table: "documents".to_string(),
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Inserts embedded chunks. Called once per ingestion run, so the
    /// whole batch goes up in a single PostgREST request.
    pub async fn insert_documents(&self, rows: &[DocumentRow]) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }

        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        let res = self
            .request(&url)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Vector store insert failed with status {}: {}",
                status, body
            )));
        }

        info!("Inserted {} rows into {}", rows.len(), self.table);
        Ok(())
    }

    /// Similarity search through the hosted `match_documents` RPC.
    pub async fn match_documents(
        &self,
        query_embedding: &[f32],
        match_count: usize,
    ) -> Result<Vec<MatchedDocument>, AppError> {
        let url = format!("{}/rest/v1/rpc/match_documents", self.base_url);
        let payload = json!({
            "query_embedding": query_embedding,
            "match_count": match_count,
        });

        let res = self.request(&url).json(&payload).send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "match_documents failed with status {}: {}",
                status, body
            )));
        }

        let rows: Vec<MatchRow> = res
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed match_documents response: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| MatchedDocument {
                content: row.content,
                metadata: row.metadata,
                similarity: row.similarity,
            })
            .collect())
    }
}
