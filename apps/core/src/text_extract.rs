//! Text extraction for ingestion sources.
//! Supports: TXT, MD, PDF.

use tracing::{info, warn};

/// Extract text content from file data based on file extension.
pub fn extract_text_from_file(file_name: &str, file_data: &[u8]) -> Result<String, String> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    info!("Extracting text from file: {} (type: {})", file_name, extension);

    match extension.as_str() {
        "txt" | "md" => String::from_utf8(file_data.to_vec())
            .map_err(|e| format!("Invalid UTF-8 content: {}", e)),

        "pdf" => extract_pdf_text(file_data),

        _ => Err(format!("Unsupported file extension: {}", extension)),
    }
}

fn extract_pdf_text(file_data: &[u8]) -> Result<String, String> {
    match pdf_extract::extract_text_from_mem(file_data) {
        Ok(text) => {
            let cleaned = clean_extracted_text(&text);
            info!("PDF extraction successful: {} characters", cleaned.len());
            Ok(cleaned)
        }
        Err(e) => {
            warn!("PDF extraction failed: {}", e);
            Err(format!("Failed to extract PDF text: {}", e))
        }
    }
}

/// Drops empty lines and surrounding whitespace left behind by PDF layout.
fn clean_extracted_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_extraction_is_passthrough() {
        let content = "Thông tin tuyển sinh 2024.\nChỉ tiêu: 1200.".as_bytes();
        let result = extract_text_from_file("tuyen-sinh.txt", content);
        assert_eq!(result.unwrap(), "Thông tin tuyển sinh 2024.\nChỉ tiêu: 1200.");
    }

    #[test]
    fn markdown_extraction_preserves_syntax() {
        let content = b"# Heading\n\n![logo](logo.png)";
        let result = extract_text_from_file("doc.md", content);
        assert!(result.unwrap().contains("![logo](logo.png)"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let result = extract_text_from_file("slides.pptx", b"whatever");
        assert!(result.unwrap_err().contains("pptx"));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let result = extract_text_from_file("broken.txt", &[0xff, 0xfe, 0x00]);
        assert!(result.unwrap_err().contains("UTF-8"));
    }

    #[test]
    fn cleanup_collapses_blank_lines() {
        assert_eq!(clean_extracted_text("  a  \n\n\n b\n"), "a\nb");
    }
}
