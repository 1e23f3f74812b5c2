//! The caller-facing study assistant.
//!
//! [`StudyAssistant`] wires the indexer, retriever and agent dispatcher
//! together and pushes every generation call through the single
//! [`RequestSerializer`].

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AgentError, AppError, IndexError, RetrievalError, VectorStoreError};
use crate::models::{
    Config, Difficulty, Document, RequestParams, Request, Response, RetrievalResults,
    RetrievedChunk, join_context,
};
use crate::services::agent::AgentDispatcher;
use crate::services::chunker::TextChunker;
use crate::services::embedding::{EmbeddingBackend, OllamaEmbeddingClient};
use crate::services::generation::{GenerativeBackend, OllamaGenerationClient};
use crate::services::indexer::{DocumentIndexer, IndexReport};
use crate::services::metrics::{MetricsStore, MetricsSummary};
use crate::services::retriever::Retriever;
use crate::services::serializer::RequestSerializer;
use crate::services::vector_store::{DocumentSummary, SqliteIndexStore, VectorIndex};
use crate::utils::extract_text;

const DEFAULT_K: usize = 3;
const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// A RAG answer together with the chunks it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub response: Response,
    pub sources: Vec<RetrievedChunk>,
}

/// Snapshot of the assistant's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantStatus {
    pub collection: Option<String>,
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub generation_model: String,
    pub pending_requests: usize,
    pub metrics: Option<MetricsSummary>,
}

pub struct StudyAssistant {
    index: Arc<VectorIndex>,
    indexer: DocumentIndexer,
    retriever: Retriever,
    dispatcher: Arc<AgentDispatcher>,
    serializer: Arc<RequestSerializer>,
    metrics: Option<Arc<MetricsStore>>,
    metrics_retention_days: u32,
    default_k: usize,
    max_file_size: u64,
}

impl StudyAssistant {
    /// Assemble an assistant from explicit parts.
    ///
    /// Assistants that hand the same `serializer` here never call their
    /// backends at the same time.
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        dispatcher: AgentDispatcher,
        index: Arc<VectorIndex>,
        chunker: TextChunker,
        serializer: Arc<RequestSerializer>,
    ) -> Self {
        Self {
            indexer: DocumentIndexer::new(chunker, embedder.clone(), index.clone()),
            retriever: Retriever::new(embedder, index.clone()),
            index,
            dispatcher: Arc::new(dispatcher),
            serializer,
            metrics: None,
            metrics_retention_days: crate::models::DEFAULT_METRICS_RETENTION_DAYS,
            default_k: DEFAULT_K,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Build the Ollama-backed assistant described by `config`.
    ///
    /// Uses the process-wide gate. Must run inside a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let embedder: Arc<dyn EmbeddingBackend> =
            Arc::new(OllamaEmbeddingClient::new(&config.embedding)?);
        let generator: Arc<dyn GenerativeBackend> =
            Arc::new(OllamaGenerationClient::new(&config.generation)?);
        let dispatcher = AgentDispatcher::from_config(generator, &config.generation);

        let dimension = config.embedding.dimension as usize;
        let index = match config.index_dir() {
            Some(dir) => {
                let store = SqliteIndexStore::open(
                    &dir.join("index.db"),
                    &config.storage.collection,
                    dimension,
                )?;
                VectorIndex::open(Box::new(store), dimension)?
            }
            None => {
                warn!("could not determine index directory, index will not be persisted");
                VectorIndex::in_memory(dimension)
            }
        };

        let chunker = TextChunker::from_config(&config.indexing)?;
        let mut assistant = Self::new(
            embedder,
            dispatcher,
            Arc::new(index),
            chunker,
            RequestSerializer::shared(),
        )
            .with_default_k(config.retrieval.default_k as usize)
            .with_max_file_size(config.indexing.max_file_size);

        if config.metrics.enabled
            && let Some(store) = open_metrics(config.metrics.retention_days)
        {
            assistant = assistant.with_metrics(Arc::new(store), config.metrics.retention_days);
        }

        info!(
            collection = %config.storage.collection,
            chunks = assistant.index.len(),
            "study assistant ready"
        );
        Ok(assistant)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsStore>, retention_days: u32) -> Self {
        self.metrics = Some(metrics);
        self.metrics_retention_days = retention_days;
        self
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Run one generation request through the serializer.
    ///
    /// Waits behind every earlier request in the process. Failures, including
    /// a shut-down queue, come back as [`AgentError`].
    pub async fn submit_request(&self, params: RequestParams) -> Result<Response, AgentError> {
        let request = Request::new(params);
        let kind = request.kind();
        request
            .params
            .validate()
            .map_err(|cause| AgentError::new(kind, cause))?;

        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        self.serializer
            .run_exclusive(move || async move {
                let start = Instant::now();
                let result = dispatcher.dispatch(&request).await;
                if let Some(metrics) = metrics {
                    metrics.record(kind, start.elapsed().as_millis() as u64, result.is_ok());
                }
                result.map(|text| Response::for_request(&request, text))
            })
            .await
            .map_err(|e| AgentError::new(kind, e.to_string()))?
    }

    pub async fn explain(
        &self,
        question: &str,
        context: Option<String>,
    ) -> Result<Response, AgentError> {
        self.submit_request(RequestParams::Explain {
            question: question.to_string(),
            context,
        })
        .await
    }

    pub async fn summarize(&self, notes: &str) -> Result<Response, AgentError> {
        self.submit_request(RequestParams::summarize(notes)).await
    }

    pub async fn quiz(
        &self,
        content: &str,
        count: u32,
        difficulty: Difficulty,
    ) -> Result<Response, AgentError> {
        self.submit_request(RequestParams::quiz(content, count, difficulty))
            .await
    }

    /// Answer a question from the indexed notes.
    ///
    /// If retrieval fails the question is still answered, with an empty context.
    pub async fn ask_notes(
        &self,
        question: &str,
        k: Option<usize>,
    ) -> Result<GroundedAnswer, AgentError> {
        let k = k.unwrap_or(self.default_k);
        let sources = match self.retriever.retrieve(question, k).await {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        };

        let context = join_context(&sources);
        let response = self
            .submit_request(RequestParams::rag_answer(question, context))
            .await?;
        Ok(GroundedAnswer { response, sources })
    }

    pub async fn index_document(&self, document: &Document) -> Result<IndexReport, IndexError> {
        self.indexer.index(document).await
    }

    /// Extract a file's text and index it under its file name.
    pub async fn index_file(&self, path: &Path) -> Result<IndexReport, AppError> {
        let text = extract_text(path, self.max_file_size)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.index_document(&Document::new(name, text)).await?)
    }

    pub async fn retrieve_context(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        self.retriever.retrieve(query, k).await
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResults, RetrievalError> {
        self.retriever.search(query, k).await
    }

    pub fn documents(&self) -> Vec<DocumentSummary> {
        self.index.documents()
    }

    pub fn remove_document(&self, document_id: &str) -> Result<usize, VectorStoreError> {
        self.index.remove_document(document_id)
    }

    pub fn clear_index(&self) -> Result<(), VectorStoreError> {
        self.index.clear()
    }

    pub fn status(&self) -> AssistantStatus {
        AssistantStatus {
            collection: self.index.collection().map(str::to_string),
            documents: self.index.document_count(),
            chunks: self.index.len(),
            dimension: self.index.dimension(),
            generation_model: self.dispatcher.backend().model().to_string(),
            pending_requests: self.serializer.pending(),
            metrics: self
                .metrics
                .as_ref()
                .map(|m| m.summary(self.metrics_retention_days)),
        }
    }

    /// Stop taking requests and wait for queued ones to finish.
    ///
    /// Closes the gate for every assistant sharing it.
    pub async fn shutdown(&self) {
        self.serializer.shutdown().await;
        info!("study assistant stopped");
    }
}

fn open_metrics(retention_days: u32) -> Option<MetricsStore> {
    let path = Config::metrics_db_path()?;
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!("failed to create metrics directory: {}", e);
        return None;
    }
    match MetricsStore::open(&path) {
        Ok(store) => {
            let pruned = store.prune(retention_days);
            if pruned > 0 {
                debug!("pruned {pruned} old metrics rows");
            }
            Some(store)
        }
        Err(e) => {
            warn!("failed to open metrics database: {}", e);
            None
        }
    }
}
