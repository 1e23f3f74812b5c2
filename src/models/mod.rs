mod config;
mod document;
mod request;
mod search;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LLM_MODEL, DEFAULT_METRICS_RETENTION_DAYS,
    DEFAULT_OLLAMA_URL, DaemonConfig, EmbeddingConfig, GenerationConfig, IndexingConfig,
    MetricsConfig, RetrievalConfig, StorageConfig,
};
pub use document::{Chunk, Document, IndexEntry};
pub use request::{Difficulty, Request, RequestKind, RequestParams, Response};
pub use search::{CONTEXT_SEPARATOR, OutputFormat, RetrievalResults, RetrievedChunk, join_context};
