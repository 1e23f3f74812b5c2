use serde::{Deserialize, Serialize};

use crate::utils::calculate_checksum;

/// Extracted document text plus a content identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub text: String,
    pub created_at: String,
}

/// A bounded, contiguous slice of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub ordinal: u32,
    /// Character offsets into the document text.
    pub start_offset: u64,
    pub end_offset: u64,
}

/// A chunk paired with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl Document {
    /// Identifier derived from the text, so identical content maps to the same document.
    pub fn generate_id(text: &str) -> String {
        let mut id = calculate_checksum(text);
        id.truncate(32);
        id
    }

    pub fn new(name: impl Into<String>, text: String) -> Self {
        Self {
            id: Self::generate_id(&text),
            name: name.into(),
            text,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Chunk {
    pub fn generate_id(document_id: &str, ordinal: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", document_id, ordinal);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn new(
        document_id: &str,
        text: String,
        ordinal: u32,
        start_offset: u64,
        end_offset: u64,
    ) -> Self {
        Self {
            id: Self::generate_id(document_id, ordinal),
            document_id: document_id.to_string(),
            text,
            ordinal,
            start_offset,
            end_offset,
        }
    }
}
