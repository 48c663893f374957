//! Document ingestion pipeline.
//!
//! One-shot ETL invoked from the CLI: read a source (markdown folders,
//! loose PDF/TXT files, or web pages), split into overlapping chunks,
//! embed each chunk and upsert the vectors into the hosted store. Nothing
//! here is incremental; re-running a source re-ingests it.

pub mod documents;
pub mod markdown;
pub mod source_links;
pub mod splitter;
pub mod websites;

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::AppError;
use crate::fs_manager::PortablePathManager;
use crate::media::cloudinary::CloudinaryClient;
use crate::models::DocMetadata;
use crate::vector_store::{DocumentRow, VectorStoreClient};
use futures::future::try_join_all;
use splitter::RecursiveCharacterSplitter;
use tracing::{info, warn};

/// Markdown folders are processed in concurrent groups of this size.
const FOLDER_GROUP_SIZE: usize = 5;

/// A source document ready for splitting.
#[derive(Debug, Clone)]
pub struct IngestDocument {
    pub content: String,
    pub metadata: DocMetadata,
}

/// What an ingestion run accomplished.
#[derive(Debug, Clone, Copy)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Lowercased, underscore-joined form of a title, used as a stable id.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Ingests every markdown folder under the configured root.
pub async fn run_markdown(
    config: &Config,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<IngestReport, AppError> {
    let cloudinary = CloudinaryClient::new(config.cloudinary()?.clone());
    let root = PortablePathManager::markdown_dir();

    let mut folder_names = Vec::new();
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            folder_names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    folder_names.sort();

    if folder_names.is_empty() {
        warn!("No markdown folders under {:?}, nothing to ingest", root);
        return Ok(IngestReport { documents: 0, chunks: 0 });
    }

    let mut documents = Vec::new();
    for group in folder_names.chunks(FOLDER_GROUP_SIZE) {
        let processed = try_join_all(
            group
                .iter()
                .map(|name| markdown::process_folder(&cloudinary, &root, name)),
        )
        .await?;
        documents.extend(processed.into_iter().flatten());
    }

    split_embed_store(config, documents, chunk_size, chunk_overlap).await
}

/// Ingests loose PDF/TXT files from a directory.
pub async fn run_documents(
    config: &Config,
    dir: Option<std::path::PathBuf>,
    type_filter: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<IngestReport, AppError> {
    let dir = dir.unwrap_or_else(PortablePathManager::upload_dir);
    let documents = documents::load_directory(&dir, type_filter)?;
    split_embed_store(config, documents, chunk_size, chunk_overlap).await
}

/// Ingests the given web pages.
pub async fn run_websites(
    config: &Config,
    urls: &[String],
    selector: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<IngestReport, AppError> {
    let http = reqwest::Client::new();
    let documents = websites::load_websites(&http, urls, selector).await?;
    split_embed_store(config, documents, chunk_size, chunk_overlap).await
}

/// The shared pipeline tail: split every document, embed all chunks and
/// insert the rows.
async fn split_embed_store(
    config: &Config,
    documents: Vec<IngestDocument>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<IngestReport, AppError> {
    if documents.is_empty() {
        return Ok(IngestReport { documents: 0, chunks: 0 });
    }

    let splitter = RecursiveCharacterSplitter::new(chunk_size, chunk_overlap);

    let mut texts = Vec::new();
    let mut metadatas = Vec::new();
    for document in &documents {
        for chunk in splitter.split(&document.content) {
            texts.push(chunk);
            metadatas.push(document.metadata.clone());
        }
    }

    if texts.is_empty() {
        warn!("All documents split to nothing, no rows to insert");
        return Ok(IngestReport { documents: documents.len(), chunks: 0 });
    }

    info!(
        "Embedding {} chunks from {} documents",
        texts.len(),
        documents.len()
    );

    let embeddings = EmbeddingClient::new(config).embed_many(&texts).await?;

    let rows: Vec<DocumentRow> = texts
        .into_iter()
        .zip(metadatas)
        .zip(embeddings)
        .map(|((content, metadata), embedding)| DocumentRow {
            content,
            metadata,
            embedding,
        })
        .collect();

    let chunk_count = rows.len();
    VectorStoreClient::new(config).insert_documents(&rows).await?;

    info!(
        "Ingestion complete: {} documents, {} chunks",
        documents.len(),
        chunk_count
    );

    Ok(IngestReport {
        documents: documents.len(),
        chunks: chunk_count,
    })
}
