//! Markdown folder source.
//!
//! Each document lives in its own folder: `<root>/<name>/<name>.md` plus
//! the images the markdown references with relative links. Processing a
//! folder uploads those images, rewrites the links to the hosted URLs,
//! writes the rewritten markdown to the processed directory and resolves
//! the document's citation metadata (curated source link, or the folder's
//! uploaded PDF).

use crate::error::AppError;
use crate::ingest::source_links::{self, UNIVERSITY_LOGO};
use crate::ingest::{slugify, IngestDocument};
use crate::media::cloudinary::{CloudinaryClient, ImageBuffer};
use crate::models::DocMetadata;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Cloudinary folder the embedded images land in.
const IMAGE_FOLDER: &str = "PdfImages";

/// Matches markdown image links to local `.png`/`.jpeg` files. Absolute
/// http(s) links also match and are filtered out afterwards, since the
/// regex engine has no look-ahead.
fn image_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\(([^)]+?\.(?:png|jpeg))\)").expect("valid regex"))
}

/// Extracts the relative image targets referenced by `markdown`.
pub fn extract_local_image_links(markdown: &str) -> Vec<String> {
    image_link_re()
        .captures_iter(markdown)
        .map(|captures| captures[1].to_string())
        .filter(|target| !target.starts_with("http://") && !target.starts_with("https://"))
        .collect()
}

/// Replaces each `(relative target)` with its `(hosted URL)`.
pub fn rewrite_image_links(
    markdown: &str,
    uploads: &[crate::media::cloudinary::UploadedAsset],
) -> String {
    let mut rewritten = markdown.to_string();
    for upload in uploads {
        let relative = format!("({})", upload.origin_file_name);
        let hosted = format!("({})", upload.url);
        rewritten = rewritten.replace(&relative, &hosted);
    }
    rewritten
}

/// Processes one markdown folder into an ingestible document.
/// Returns `None` when the folder has no markdown file.
pub async fn process_folder(
    cloudinary: &CloudinaryClient,
    root: &Path,
    folder_name: &str,
) -> Result<Option<IngestDocument>, AppError> {
    let md_path = root.join(folder_name).join(format!("{}.md", folder_name));
    let markdown = match tokio::fs::read_to_string(&md_path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Skipping folder {:?}: cannot read {:?}: {}", folder_name, md_path, e);
            return Ok(None);
        }
    };

    // Collect the referenced images; a missing file is not fatal, the
    // link just stays relative.
    let mut images = Vec::new();
    for file_name in extract_local_image_links(&markdown) {
        let image_path = root.join(folder_name).join(&file_name);
        match tokio::fs::read(&image_path).await {
            Ok(buffer) => images.push(ImageBuffer {
                origin_file_name: file_name,
                buffer,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image not found, leaving link untouched: {:?}", image_path);
            }
            Err(e) => return Err(AppError::Io(e)),
        }
    }

    let rewritten = if images.is_empty() {
        markdown
    } else {
        let uploads = cloudinary.upload_many(&images, IMAGE_FOLDER).await?;
        rewrite_image_links(&markdown, &uploads)
    };

    // Keep the processed rendition on disk for inspection and re-runs.
    let processed_path = crate::fs_manager::PortablePathManager::processed_dir()
        .join(format!("{}.md", folder_name));
    tokio::fs::write(&processed_path, &rewritten).await?;

    let metadata = resolve_metadata(cloudinary, root, folder_name).await?;
    info!("Processed markdown folder {:?}", folder_name);

    Ok(Some(IngestDocument {
        content: rewritten,
        metadata,
    }))
}

/// Citation metadata: the curated link when the folder title is known,
/// otherwise the folder's PDF uploaded under a stable slug.
async fn resolve_metadata(
    cloudinary: &CloudinaryClient,
    root: &Path,
    folder_name: &str,
) -> Result<DocMetadata, AppError> {
    if let Some(link) = source_links::find_by_title(folder_name) {
        return Ok(DocMetadata {
            id: link.id.to_string(),
            title: link.title.to_string(),
            link: link.url.to_string(),
            favicon: UNIVERSITY_LOGO.to_string(),
            snippet: link.title.to_string(),
        });
    }

    let slug = slugify(folder_name);
    let pdf_path = root.join(folder_name).join(format!("{}.pdf", folder_name));
    match tokio::fs::read(&pdf_path).await {
        Ok(bytes) => {
            let (public_id, url) = cloudinary.upload_pdf(&bytes, &slug).await?;
            Ok(DocMetadata {
                id: public_id,
                title: format!("{}.pdf", folder_name),
                link: url,
                favicon: UNIVERSITY_LOGO.to_string(),
                snippet: folder_name.to_string(),
            })
        }
        Err(e) => {
            warn!(
                "No curated link and no PDF for folder {:?} ({}); citing without a link",
                folder_name, e
            );
            Ok(DocMetadata {
                id: slug,
                title: folder_name.to_string(),
                link: String::new(),
                favicon: UNIVERSITY_LOGO.to_string(),
                snippet: folder_name.to_string(),
            })
        }
    }
}
