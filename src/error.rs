//! Error types for the study assistant.

use thiserror::Error;

use crate::models::RequestKind;
use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => is_transient_status(msg),
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_) => false,
        }
    }
}

/// Errors raised by the generative backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to connect to generation server: {0}")]
    ConnectionError(String),

    #[error("generation server error: {0}")]
    ServerError(String),

    #[error("generation request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation timed out after {0}s")]
    Timeout(u64),
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::ConnectionError(_) => true,
            GenerationError::ServerError(msg) => is_transient_status(msg),
            GenerationError::RequestError(e) => e.is_connect(),
            // A timed-out generation already held the model for the full budget
            GenerationError::Timeout(_) | GenerationError::InvalidResponse(_) => false,
        }
    }
}

fn is_transient_status(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    msg.contains("503")
        || msg.contains("502")
        || msg.contains("504")
        || msg.contains("429")
        || lower.contains("unavailable")
        || lower.contains("too many requests")
}

/// Errors related to vector index storage.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("chunk belongs to document {actual}, not {expected}")]
    DocumentMismatch { expected: String, actual: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt index entry: {0}")]
    Corrupt(String),
}

/// Errors related to indexing a document.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("document has no indexable text")]
    EmptyDocument,

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("embedding backend returned {actual} vectors for {expected} chunks")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Errors related to retrieving context for a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Errors raised while filling a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("missing value for slot '{0}'")]
    MissingSlot(String),

    #[error("unterminated slot starting at byte {0}")]
    Unterminated(usize),
}

/// A failed generation request, carrying the kind that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} request failed: {cause}")]
pub struct AgentError {
    pub kind: RequestKind,
    pub cause: String,
}

impl AgentError {
    pub fn new(kind: RequestKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    /// Text shown to the user in place of the assistant's reply.
    pub fn as_reply(&self) -> String {
        format!("[Error from {} agent] {}", self.kind, self.cause)
    }
}

/// Failures of the request serializer itself, as opposed to the job it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerializerError {
    #[error("request queue is shut down")]
    Closed,

    #[error("request panicked while holding the queue")]
    Panicked,
}

/// Errors related to document text extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("document exceeds maximum size: {size} > {max}")]
    TooLarge { size: u64, max: u64 },
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to the background daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon is not running")]
    NotRunning,

    #[error("failed to spawn daemon: {0}")]
    SpawnError(String),

    #[error("failed to connect to daemon: {0}")]
    ConnectionFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("daemon did not become ready in time")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryable() {
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ConnectionError("refused".into()).is_retryable());
        assert!(EmbeddingError::ServerError("status 503: busy".into()).is_retryable());
        assert!(!EmbeddingError::ServerError("status 400: bad".into()).is_retryable());
        assert!(!EmbeddingError::InvalidResponse("empty".into()).is_retryable());
    }

    #[test]
    fn test_generation_timeout_not_retryable() {
        assert!(!GenerationError::Timeout(30).is_retryable());
        assert!(GenerationError::ServerError("status 429: slow down".into()).is_retryable());
    }

    #[test]
    fn test_agent_error_reply() {
        let err = AgentError::new(RequestKind::Quiz, "connection refused");
        assert_eq!(err.to_string(), "quiz request failed: connection refused");
        assert_eq!(err.as_reply(), "[Error from quiz agent] connection refused");
    }
}
