//! Document indexing: chunk, embed, then write to the index in one step.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IndexError;
use crate::models::{Document, IndexEntry};
use crate::services::chunker::TextChunker;
use crate::services::embedding::EmbeddingBackend;
use crate::services::vector_store::VectorIndex;

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: String,
    pub name: String,
    pub chunks: usize,
    /// Chunks of an earlier version of the same document that were replaced.
    pub replaced: usize,
}

/// Orchestrates the chunker and embedding backend into the vector index.
///
/// Every embedding is computed before anything is written, so a backend
/// failure part-way through leaves the index exactly as it was.
pub struct DocumentIndexer {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<VectorIndex>,
}

impl DocumentIndexer {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<VectorIndex>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
        }
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    pub async fn index(&self, document: &Document) -> Result<IndexReport, IndexError> {
        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        debug!(document = %document.id, chunks = texts.len(), "embedding chunks");
        let embeddings = self.embedder.embed_documents(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();

        let outcome = self.index.upsert(&document.id, entries)?;
        info!(
            document = %document.id,
            name = %document.name,
            chunks = outcome.inserted,
            replaced = outcome.replaced,
            "indexed document"
        );

        Ok(IndexReport {
            document_id: document.id.clone(),
            name: document.name.clone(),
            chunks: outcome.inserted,
            replaced: outcome.replaced,
        })
    }
}
