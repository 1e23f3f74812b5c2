//! File utilities for document intake.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ExtractError;

/// Calculate SHA-256 checksum of content.
pub fn calculate_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(hash)
}

/// Document formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

/// Classify a path by extension, falling back to sniffing the first bytes.
pub fn document_kind(path: &Path) -> Option<DocumentKind> {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if ext == "pdf" {
            return Some(DocumentKind::Pdf);
        }
        if is_text_extension(&ext) {
            return Some(DocumentKind::Text);
        }
    }

    if let Ok(file) = fs::File::open(path) {
        let mut buffer = [0u8; 512];
        let mut reader = std::io::BufReader::new(file);
        if let Ok(n) = reader.read(&mut buffer) {
            if buffer[..n].starts_with(b"%PDF-") {
                return Some(DocumentKind::Pdf);
            }
            // Null bytes mean binary
            if !buffer[..n].contains(&0) {
                return Some(DocumentKind::Text);
            }
        }
    }

    None
}

/// Read a file with a size limit.
pub fn read_file_bytes(path: &Path, max_size: u64) -> Result<Vec<u8>, ExtractError> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(ExtractError::TooLarge {
            size: metadata.len(),
            max: max_size,
        });
    }

    Ok(fs::read(path)?)
}

/// Collect supported documents under `path`, skipping glob-excluded paths.
pub fn collect_documents(path: &Path, exclude: &[String]) -> Result<Vec<PathBuf>, ExtractError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let patterns: Vec<glob::Pattern> = exclude
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| ExtractError::Io(std::io::Error::other(e.to_string())))?;
        let entry_path = entry.path();
        if !entry_path.is_file() {
            continue;
        }

        let path_str = entry_path.to_string_lossy();
        if patterns.iter().any(|p| p.matches(&path_str)) {
            continue;
        }

        if document_kind(entry_path).is_some() {
            files.push(entry_path.to_path_buf());
        }
    }

    Ok(files)
}

fn is_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        "txt" | "md" | "markdown" | "rst" | "adoc" | "org" | "tex" | "csv" | "json" | "html"
            | "htm"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_checksum() {
        let checksum = calculate_checksum("hello world");
        assert_eq!(checksum.len(), 64);
    }

    #[test]
    fn test_document_kind_by_extension() {
        assert_eq!(
            document_kind(Path::new("lecture.pdf")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            document_kind(Path::new("notes.md")),
            Some(DocumentKind::Text)
        );
    }

    #[test]
    fn test_document_kind_sniffs_content() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes");
        std::fs::write(&text, "plain notes").unwrap();
        let binary = dir.path().join("blob");
        std::fs::write(&binary, [0u8, 1, 2, 3]).unwrap();

        assert_eq!(document_kind(&text), Some(DocumentKind::Text));
        assert_eq!(document_kind(&binary), None);
    }

    #[test]
    fn test_read_file_bytes_enforces_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(100)).unwrap();

        assert!(matches!(
            read_file_bytes(&path, 10),
            Err(ExtractError::TooLarge { size: 100, max: 10 })
        ));
        assert_eq!(read_file_bytes(&path, 100).unwrap().len(), 100);
    }

    #[test]
    fn test_collect_documents_applies_excludes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::create_dir(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts").join("b.md"), "b").unwrap();

        let all = collect_documents(dir.path(), &[]).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = collect_documents(dir.path(), &["**/drafts/**".to_string()]).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].ends_with("a.md"));
    }
}
