//! Vector index with optional persistent backing.
//!
//! The in-memory [`VectorIndex`] answers queries; an [`IndexStore`] keeps its
//! entries durable across restarts. Every write goes to the store first and is
//! applied in memory only once the store has committed, so a failed write leaves
//! both sides unchanged.

mod sqlite;

pub use sqlite::SqliteIndexStore;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VectorStoreError;
use crate::models::{IndexEntry, RetrievedChunk};

/// An index entry with its insertion sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub seq: u64,
    pub entry: IndexEntry,
}

/// Durable storage for index entries, keyed by an index-instance identifier.
pub trait IndexStore: Send + Sync {
    /// All entries, ordered by insertion sequence.
    fn load(&self) -> Result<Vec<StoredEntry>, VectorStoreError>;

    /// Replace every entry of `document_id` with `entries` in one transaction.
    fn replace_document(
        &self,
        document_id: &str,
        entries: &[StoredEntry],
    ) -> Result<(), VectorStoreError>;

    /// Delete a document's entries, returning how many were removed.
    fn delete_document(&self, document_id: &str) -> Result<usize, VectorStoreError>;

    fn clear(&self) -> Result<(), VectorStoreError>;

    /// Name of the index instance this store holds.
    fn collection(&self) -> &str;

    /// Embedding dimension fixed for the collection.
    fn dimension(&self) -> usize;
}

/// Result of replacing one document's chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub replaced: usize,
}

/// Per-document chunk counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub chunks: usize,
}

#[derive(Debug, Default)]
struct IndexState {
    /// Kept in insertion order.
    entries: Vec<StoredEntry>,
    next_seq: u64,
}

/// Append-oriented store of chunks and embeddings with nearest-neighbor query.
pub struct VectorIndex {
    dimension: usize,
    state: RwLock<IndexState>,
    store: Option<Box<dyn IndexStore>>,
}

impl VectorIndex {
    /// Create an index that lives only in memory.
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(IndexState::default()),
            store: None,
        }
    }

    /// Open an index backed by `store`, reloading its entries.
    pub fn open(store: Box<dyn IndexStore>, dimension: usize) -> Result<Self, VectorStoreError> {
        if store.dimension() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: store.dimension(),
                actual: dimension,
            });
        }
        let entries = store.load()?;
        for stored in &entries {
            check_dimension(dimension, &stored.entry.embedding)?;
        }
        let next_seq = entries.last().map_or(0, |e| e.seq + 1);
        debug!(
            collection = store.collection(),
            entries = entries.len(),
            "loaded vector index"
        );

        Ok(Self {
            dimension,
            state: RwLock::new(IndexState { entries, next_seq }),
            store: Some(store),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn collection(&self) -> Option<&str> {
        self.store.as_deref().map(IndexStore::collection)
    }

    /// Atomically replace all chunks of `document_id` with `entries`.
    pub fn upsert(
        &self,
        document_id: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<UpsertOutcome, VectorStoreError> {
        for entry in &entries {
            check_dimension(self.dimension, &entry.embedding)?;
            if entry.chunk.document_id != document_id {
                return Err(VectorStoreError::DocumentMismatch {
                    expected: document_id.to_string(),
                    actual: entry.chunk.document_id.clone(),
                });
            }
        }

        let mut state = self.write();
        let first_seq = state.next_seq;
        let stored: Vec<StoredEntry> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| StoredEntry {
                seq: first_seq + i as u64,
                entry,
            })
            .collect();

        if let Some(store) = &self.store {
            store.replace_document(document_id, &stored)?;
        }

        let before = state.entries.len();
        state
            .entries
            .retain(|e| e.entry.chunk.document_id != document_id);
        let replaced = before - state.entries.len();
        let inserted = stored.len();
        state.next_seq = first_seq + inserted as u64;
        state.entries.extend(stored);

        Ok(UpsertOutcome { inserted, replaced })
    }

    /// Rank stored chunks by cosine similarity to `embedding`.
    ///
    /// Ties are broken by ascending chunk ordinal, then insertion order.
    /// `k` is clamped to the index size.
    pub fn query(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, VectorStoreError> {
        check_dimension(self.dimension, embedding)?;

        let state = self.read();
        let mut scored: Vec<(f32, u32, u64, &IndexEntry)> = state
            .entries
            .iter()
            .map(|e| {
                (
                    cosine_similarity(embedding, &e.entry.embedding),
                    e.entry.chunk.ordinal,
                    e.seq,
                    &e.entry,
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, _, _, entry)| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }

    /// Remove a document's chunks, returning how many were removed.
    pub fn remove_document(&self, document_id: &str) -> Result<usize, VectorStoreError> {
        let mut state = self.write();
        if let Some(store) = &self.store {
            store.delete_document(document_id)?;
        }
        let before = state.entries.len();
        state
            .entries
            .retain(|e| e.entry.chunk.document_id != document_id);
        Ok(before - state.entries.len())
    }

    pub fn clear(&self) -> Result<(), VectorStoreError> {
        let mut state = self.write();
        if let Some(store) = &self.store {
            store.clear()?;
        }
        state.entries.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.read()
            .entries
            .iter()
            .any(|e| e.entry.chunk.document_id == document_id)
    }

    /// Documents in order of first insertion, with their chunk counts.
    pub fn documents(&self) -> Vec<DocumentSummary> {
        let state = self.read();
        let mut summaries: Vec<DocumentSummary> = Vec::new();
        for stored in &state.entries {
            let id = &stored.entry.chunk.document_id;
            match summaries.iter_mut().find(|s| &s.document_id == id) {
                Some(summary) => summary.chunks += 1,
                None => summaries.push(DocumentSummary {
                    document_id: id.clone(),
                    chunks: 1,
                }),
            }
        }
        summaries
    }

    pub fn document_count(&self) -> usize {
        self.documents().len()
    }

    // Writers only mutate after the fallible store call succeeds, so a
    // poisoned lock still guards consistent state.
    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_dimension(expected: usize, embedding: &[f32]) -> Result<(), VectorStoreError> {
    if embedding.len() != expected {
        return Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

/// Cosine similarity; zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn entry(doc: &str, ordinal: u32, text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk::new(doc, text.to_string(), ordinal, 0, text.len() as u64),
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_query_empty_index() {
        let index = VectorIndex::in_memory(2);
        assert!(index.query(&[1.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_query_ranks_by_score() {
        let index = VectorIndex::in_memory(2);
        index
            .upsert(
                "doc",
                vec![
                    entry("doc", 0, "far", vec![0.0, 1.0]),
                    entry("doc", 1, "near", vec![1.0, 0.1]),
                    entry("doc", 2, "mid", vec![1.0, 1.0]),
                ],
            )
            .unwrap();

        let results = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "near");
        assert_eq!(results[1].chunk.text, "mid");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_ties_break_by_ordinal_then_insertion() {
        let index = VectorIndex::in_memory(2);
        index
            .upsert("b", vec![entry("b", 1, "b1", vec![1.0, 0.0])])
            .unwrap();
        index
            .upsert(
                "a",
                vec![
                    entry("a", 1, "a1", vec![1.0, 0.0]),
                    entry("a", 0, "a0", vec![1.0, 0.0]),
                ],
            )
            .unwrap();

        let texts: Vec<String> = index
            .query(&[1.0, 0.0], 10)
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.text)
            .collect();
        assert_eq!(texts, vec!["a0", "b1", "a1"]);
    }

    #[test]
    fn test_k_is_clamped() {
        let index = VectorIndex::in_memory(2);
        index
            .upsert("doc", vec![entry("doc", 0, "only", vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(index.query(&[1.0, 0.0], 50).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_replaces_document() {
        let index = VectorIndex::in_memory(2);
        let chunks = || {
            vec![
                entry("doc", 0, "one", vec![1.0, 0.0]),
                entry("doc", 1, "two", vec![0.0, 1.0]),
            ]
        };
        let first = index.upsert("doc", chunks()).unwrap();
        let second = index.upsert("doc", chunks()).unwrap();

        assert_eq!(first, UpsertOutcome { inserted: 2, replaced: 0 });
        assert_eq!(second, UpsertOutcome { inserted: 2, replaced: 2 });
        assert_eq!(index.len(), 2);
        assert_eq!(index.document_count(), 1);
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let index = VectorIndex::in_memory(3);
        let result = index.upsert(
            "doc",
            vec![
                entry("doc", 0, "ok", vec![1.0, 0.0, 0.0]),
                entry("doc", 1, "bad", vec![1.0, 0.0]),
            ],
        );
        assert!(matches!(
            result,
            Err(VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(index.is_empty());
        assert!(index.query(&[1.0], 1).is_err());
    }

    #[test]
    fn test_rejects_foreign_chunks() {
        let index = VectorIndex::in_memory(2);
        let result = index.upsert("doc", vec![entry("other", 0, "x", vec![1.0, 0.0])]);
        assert!(matches!(
            result,
            Err(VectorStoreError::DocumentMismatch { .. })
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let index = VectorIndex::in_memory(2);
        index
            .upsert("a", vec![entry("a", 0, "a0", vec![1.0, 0.0])])
            .unwrap();
        index
            .upsert(
                "b",
                vec![
                    entry("b", 0, "b0", vec![1.0, 0.0]),
                    entry("b", 1, "b1", vec![0.0, 1.0]),
                ],
            )
            .unwrap();

        assert_eq!(
            index.documents(),
            vec![
                DocumentSummary {
                    document_id: "a".to_string(),
                    chunks: 1
                },
                DocumentSummary {
                    document_id: "b".to_string(),
                    chunks: 2
                },
            ]
        );
        assert_eq!(index.remove_document("b").unwrap(), 2);
        assert!(!index.contains_document("b"));
        index.clear().unwrap();
        assert!(index.is_empty());
    }
}
