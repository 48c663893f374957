use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Resolves every on-disk location the backend touches.
///
/// All paths live under a single data root so the whole deployment stays
/// portable: `ADMICHAT_DATA_DIR` overrides the root, otherwise `./data`
/// relative to the working directory is used.
pub struct PortablePathManager;

impl PortablePathManager {
    pub fn data_dir() -> PathBuf {
        match std::env::var("ADMICHAT_DATA_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from("data"),
        }
    }

    /// Chat history database directory (./data/db).
    pub fn db_dir() -> PathBuf {
        Self::data_dir().join("db")
    }

    /// Root of the markdown document folders awaiting ingestion
    /// (./data/documents/md/<folder>/<folder>.md plus its images).
    pub fn markdown_dir() -> PathBuf {
        Self::data_dir().join("documents").join("md")
    }

    /// Destination for markdown rewritten with hosted image URLs.
    pub fn processed_dir() -> PathBuf {
        Self::data_dir().join("documents").join("processed")
    }

    /// Directory of loose PDF/TXT documents awaiting ingestion.
    pub fn upload_dir() -> PathBuf {
        Self::data_dir().join("documents").join("upload")
    }

    /// Creates the directory tree if any part of it is missing.
    pub fn init() -> Result<(), std::io::Error> {
        for dir in [
            Self::db_dir(),
            Self::markdown_dir(),
            Self::processed_dir(),
            Self::upload_dir(),
        ] {
            if !dir.exists() {
                info!("Creating directory: {:?}", dir);
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}
