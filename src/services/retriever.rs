//! Query-time retrieval of ranked context chunks.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::RetrievalError;
use crate::models::{RetrievalResults, RetrievedChunk};
use crate::services::embedding::EmbeddingBackend;
use crate::services::vector_store::VectorIndex;

pub struct Retriever {
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Rank indexed chunks against `query`, best first, at most `k` of them.
    ///
    /// An empty index yields an empty result without contacting the
    /// embedding backend.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidQuery("k must be at least 1".to_string()));
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidQuery("query is empty".to_string()));
        }
        if self.index.is_empty() {
            debug!("index is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed_query(query).await?;
        let results = self.index.query(&embedding, k)?;
        debug!(k, results = results.len(), "retrieved context");
        Ok(results)
    }

    /// Like [`Retriever::retrieve`], timed and packaged for display.
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResults, RetrievalError> {
        let start = Instant::now();
        let results = self.retrieve(query, k).await?;
        Ok(RetrievalResults::new(
            query.to_string(),
            results,
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, VectorStoreError};
    use crate::models::{Chunk, IndexEntry};
    use async_trait::async_trait;

    /// Maps a few keywords onto axes.
    struct KeywordEmbedder {
        available: bool,
    }

    #[async_trait]
    impl EmbeddingBackend for KeywordEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if !self.available {
                return Err(EmbeddingError::ConnectionError("refused".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("cell").count() as f32,
                        t.matches("energy").count() as f32,
                        0.1,
                    ]
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn populated_index() -> Arc<VectorIndex> {
        let index = Arc::new(VectorIndex::in_memory(3));
        let texts = ["cell cell membrane", "energy from food", "cell energy"];
        let entries = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let t = t.to_string();
                IndexEntry {
                    embedding: vec![
                        t.matches("cell").count() as f32,
                        t.matches("energy").count() as f32,
                        0.1,
                    ],
                    chunk: Chunk::new("doc", t, i as u32, 0, 0),
                }
            })
            .collect();
        index.upsert("doc", entries).unwrap();
        index
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let retriever = Retriever::new(
            Arc::new(KeywordEmbedder { available: false }),
            Arc::new(VectorIndex::in_memory(3)),
        );
        let results = retriever.retrieve("anything", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_results_ranked_and_bounded() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder { available: true }), populated_index());
        let results = retriever.retrieve("what is a cell", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "cell cell membrane");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_backend_unavailable() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder { available: false }), populated_index());
        assert!(matches!(
            retriever.retrieve("cell", 1).await,
            Err(RetrievalError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_queries() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder { available: true }), populated_index());
        assert!(matches!(
            retriever.retrieve("cell", 0).await,
            Err(RetrievalError::InvalidQuery(_))
        ));
        assert!(matches!(
            retriever.retrieve("   ", 3).await,
            Err(RetrievalError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_query_dimension_checked() {
        struct Short;
        #[async_trait]
        impl EmbeddingBackend for Short {
            async fn embed_documents(
                &self,
                texts: &[String],
            ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
                Ok(texts.iter().map(|_| vec![1.0]).collect())
            }
            fn dimension(&self) -> usize {
                1
            }
        }

        let retriever = Retriever::new(Arc::new(Short), populated_index());
        assert!(matches!(
            retriever.retrieve("cell", 1).await,
            Err(RetrievalError::VectorStore(
                VectorStoreError::DimensionMismatch { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_search_packages_results() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder { available: true }), populated_index());
        let results = retriever.search("energy", 5).await.unwrap();
        assert_eq!(results.query, "energy");
        assert_eq!(results.len(), 3);
    }
}
