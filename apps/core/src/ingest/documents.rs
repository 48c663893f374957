//! Loose document source: a directory of PDF and TXT files.

use crate::error::AppError;
use crate::ingest::source_links::UNIVERSITY_LOGO;
use crate::ingest::{slugify, IngestDocument};
use crate::models::DocMetadata;
use crate::text_extract;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Reads every file under `dir` whose extension is listed in `type_filter`
/// (space-separated, e.g. `".pdf .txt"`). Files that fail extraction are
/// skipped with a warning so one broken PDF cannot sink the whole run.
pub fn load_directory(dir: &Path, type_filter: &str) -> Result<Vec<IngestDocument>, AppError> {
    let wanted: Vec<String> = type_filter
        .split_whitespace()
        .map(|ext| ext.trim_start_matches('.').to_lowercase())
        .collect();

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !wanted.contains(&extension) {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        let bytes = std::fs::read(path)?;
        let content = match text_extract::extract_text_from_file(&file_name, &bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };
        if content.trim().is_empty() {
            warn!("Skipping {:?}: extracted no text", path);
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&file_name)
            .to_string();

        documents.push(IngestDocument {
            content,
            metadata: DocMetadata {
                id: slugify(&stem),
                title: file_name,
                link: path.to_string_lossy().to_string(),
                favicon: UNIVERSITY_LOGO.to_string(),
                snippet: stem,
            },
        });
    }

    info!("Loaded {} documents from {:?}", documents.len(), dir);
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_txt_files_and_skips_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Tuyển sinh 2024.txt"), "Chỉ tiêu 1200 sinh viên.").unwrap();
        fs::write(dir.path().join("notes.docx"), "ignored").unwrap();

        let docs = load_directory(dir.path(), ".pdf .txt").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.id, "tuyển_sinh_2024");
        assert_eq!(docs[0].content, "Chỉ tiêu 1200 sinh viên.");
    }

    #[test]
    fn empty_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), "   \n  ").unwrap();
        let docs = load_directory(dir.path(), ".txt").unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn corrupt_pdf_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.pdf"), b"not a pdf at all").unwrap();
        fs::write(dir.path().join("ok.txt"), "còn lại vẫn được nạp").unwrap();

        let docs = load_directory(dir.path(), ".pdf .txt").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.title, "ok.txt");
    }
}
