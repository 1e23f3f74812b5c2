//! Document-to-text extraction.

use std::path::Path;

use tracing::debug;

use crate::error::ExtractError;
use crate::utils::file::{DocumentKind, document_kind, read_file_bytes};
use crate::utils::text::clean_text;

/// Extract cleaned plain text from a document on disk.
pub fn extract_text(path: &Path, max_size: u64) -> Result<String, ExtractError> {
    let kind = document_kind(path)
        .ok_or_else(|| ExtractError::Unsupported(path.display().to_string()))?;
    let bytes = read_file_bytes(path, max_size)?;
    debug!(path = %path.display(), ?kind, bytes = bytes.len(), "extracting text");
    extract_text_from_bytes(&bytes, kind)
}

/// Extract cleaned plain text from raw document bytes.
pub fn extract_text_from_bytes(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractError> {
    let raw = match kind {
        DocumentKind::Pdf => extract_pdf(bytes)?,
        DocumentKind::Text => String::from_utf8(bytes.to_vec())
            .map_err(|_| ExtractError::Unsupported("text is not valid UTF-8".to_string()))?,
    };
    Ok(clean_text(&raw))
}

/// Pages are separated by form feeds in the extractor output; rejoin them as paragraphs.
///
/// The extractor can panic on malformed files, so the panic is caught and reported as an error.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractError::Pdf("malformed PDF".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let pages: Vec<&str> = text
        .split('\u{c}')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    Ok(pages.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_text() {
        let text = extract_text_from_bytes(b"  \xe2\x80\x8bOsmosis notes\n", DocumentKind::Text)
            .unwrap();
        assert_eq!(text, "Osmosis notes");
    }

    #[test]
    fn test_extract_rejects_invalid_utf8() {
        let result = extract_text_from_bytes(&[0xff, 0xfe, 0x00], DocumentKind::Text);
        assert!(matches!(result, Err(ExtractError::Unsupported(_))));
    }

    #[test]
    fn test_extract_rejects_garbage_pdf() {
        let result = extract_text_from_bytes(b"%PDF-1.4 not really", DocumentKind::Pdf);
        assert!(matches!(result, Err(ExtractError::Pdf(_))));
    }

    #[test]
    fn test_extract_text_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Thermodynamics\n\nFirst law.\n").unwrap();
        let text = extract_text(&path, 1024).unwrap();
        assert_eq!(text, "# Thermodynamics\n\nFirst law.");
    }
}
