mod agent;
mod chunker;
mod embedding;
mod generation;
mod indexer;
mod metrics;
mod pipeline;
mod prompts;
mod retriever;
mod serializer;
mod vector_store;

pub use agent::AgentDispatcher;
pub use chunker::{TextChunker, TextSpan, split};
pub use embedding::{EmbeddingBackend, OllamaEmbeddingClient, VersionResponse};
pub use generation::{GenerationOptions, GenerativeBackend, OllamaGenerationClient};
pub use indexer::{DocumentIndexer, IndexReport};
pub use metrics::{KindMetrics, MetricsStore, MetricsSummary};
pub use pipeline::{AssistantStatus, GroundedAnswer, StudyAssistant};
pub use prompts::{PromptRegistry, PromptTemplate};
pub use retriever::Retriever;
pub use serializer::RequestSerializer;
pub use vector_store::{
    DocumentSummary, IndexStore, SqliteIndexStore, StoredEntry, UpsertOutcome, VectorIndex,
    cosine_similarity,
};
