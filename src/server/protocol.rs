//! Length-prefixed JSON messages exchanged over the daemon socket.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of JSON.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::models::{RequestKind, RequestParams, Response as GenerationResponse, RetrievalResults};
use crate::services::{AssistantStatus, DocumentSummary, GroundedAnswer, IndexReport};

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Shutdown,
    Status,
    Submit(SubmitRequest),
    Index(IndexRequest),
    Retrieve(RetrieveRequest),
    Ask(AskRequest),
    ListDocuments,
    RemoveDocument(RemoveRequest),
    Clear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub params: RequestParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub document_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    ShutdownAck,
    Status(StatusResponse),
    Generated(GenerationResponse),
    Indexed(IndexReport),
    Retrieved(RetrievalResults),
    Answered(GroundedAnswer),
    Documents(DocumentsResponse),
    Removed(RemovedResponse),
    Cleared,
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub pid: u32,
    pub idle_secs: u64,
    pub requests_served: u64,
    pub assistant: AssistantStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsResponse {
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedResponse {
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    /// Set when a generation request failed, so clients can rebuild the `AgentError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RequestKind>,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            message: message.into(),
            kind: None,
        })
    }
}

impl From<AgentError> for Response {
    fn from(err: AgentError) -> Self {
        Response::Error(ErrorResponse {
            message: err.cause,
            kind: Some(err.kind),
        })
    }
}

pub fn encode_message(msg: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = (json.len() as u32).to_be_bytes();
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&json);
    Ok(buf)
}

pub fn decode_length(buf: &[u8; 4]) -> usize {
    u32::from_be_bytes(*buf) as usize
}
