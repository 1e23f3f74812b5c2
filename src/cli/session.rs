//! Routes CLI commands to the daemon when one is available, otherwise to an
//! in-process assistant.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::client::DaemonClient;
use crate::error::AppError;
use crate::models::{Config, Document, RequestParams, Response, RetrievalResults};
use crate::services::{DocumentSummary, GroundedAnswer, IndexReport, StudyAssistant};

pub enum Session {
    Daemon(DaemonClient),
    Local(Arc<StudyAssistant>),
}

impl Session {
    pub async fn open(config: &Config) -> Result<Self> {
        let client = DaemonClient::new(config);
        if client.should_use() {
            match client.ensure_running().await {
                Ok(()) => {
                    debug!("using daemon");
                    return Ok(Session::Daemon(client));
                }
                Err(e) => debug!(error = %e, "daemon unavailable, running in-process"),
            }
        }

        let assistant =
            StudyAssistant::from_config(config).context("failed to start study assistant")?;
        Ok(Session::Local(Arc::new(assistant)))
    }

    pub fn is_daemon(&self) -> bool {
        matches!(self, Session::Daemon(_))
    }

    pub async fn submit(&self, params: RequestParams) -> Result<Response, AppError> {
        match self {
            Session::Daemon(client) => client.submit(params).await,
            Session::Local(assistant) => Ok(assistant.submit_request(params).await?),
        }
    }

    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<GroundedAnswer, AppError> {
        match self {
            Session::Daemon(client) => client.ask(question, k).await,
            Session::Local(assistant) => Ok(assistant.ask_notes(question, k).await?),
        }
    }

    pub async fn index(&self, document: Document) -> Result<IndexReport, AppError> {
        match self {
            Session::Daemon(client) => Ok(client.index(document.name, document.text).await?),
            Session::Local(assistant) => Ok(assistant.index_document(&document).await?),
        }
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResults, AppError> {
        match self {
            Session::Daemon(client) => Ok(client.retrieve(query, k).await?),
            Session::Local(assistant) => Ok(assistant.search(query, k).await?),
        }
    }

    pub async fn documents(&self) -> Result<Vec<DocumentSummary>, AppError> {
        match self {
            Session::Daemon(client) => Ok(client.documents().await?),
            Session::Local(assistant) => Ok(assistant.documents()),
        }
    }

    pub async fn remove_document(&self, document_id: &str) -> Result<usize, AppError> {
        match self {
            Session::Daemon(client) => Ok(client.remove_document(document_id).await?),
            Session::Local(assistant) => Ok(assistant.remove_document(document_id)?),
        }
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        match self {
            Session::Daemon(client) => Ok(client.clear().await?),
            Session::Local(assistant) => Ok(assistant.clear_index()?),
        }
    }

    /// Let queued work finish before the process exits.
    pub async fn close(self) {
        if let Session::Local(assistant) = self {
            assistant.shutdown().await;
        }
    }
}
