use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::client::DaemonClient;
use crate::models::{Config, OutputFormat};
use crate::services::{OllamaEmbeddingClient, StudyAssistant};

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let client = DaemonClient::new(&config);
    let daemon = if client.is_running() {
        client.status().await.ok()
    } else {
        None
    };

    let embedding_client = OllamaEmbeddingClient::new(&config.embedding)?;
    let ollama_version = match embedding_client.health_check().await {
        Ok(v) => Some(v.version.unwrap_or_else(|| "unknown".to_string())),
        Err(e) => {
            if verbose {
                eprintln!("Ollama health check failed: {e}");
            }
            None
        }
    };

    let assistant = match daemon {
        Some(ref d) => Some(d.assistant.clone()),
        // Opening the index directly is cheap and needs no network.
        None => match StudyAssistant::from_config(&config) {
            Ok(local) => {
                let status = local.status();
                local.shutdown().await;
                Some(status)
            }
            Err(e) => {
                if verbose {
                    eprintln!("Could not open index: {e}");
                }
                None
            }
        },
    };

    let status = StatusInfo {
        daemon_running: daemon.is_some(),
        daemon_pid: daemon.as_ref().map(|d| d.pid),
        daemon_idle_secs: daemon.as_ref().map(|d| d.idle_secs),
        requests_served: daemon.as_ref().map(|d| d.requests_served),
        ollama_url: embedding_client.base_url().to_string(),
        ollama_version,
        embedding_model: embedding_client.model().to_string(),
        assistant,
    };

    print!("{}", formatter.format_status(&status));

    if !status.daemon_running || status.ollama_version.is_none() {
        eprintln!();
        if !status.daemon_running {
            eprintln!("Hint: daemon not running. Commands run in-process unless it is started.");
            eprintln!("      Start it with: studysphere serve");
        }
        if status.ollama_version.is_none() {
            eprintln!(
                "Warning: Ollama not reachable at {}. Start it with: ollama serve",
                status.ollama_url
            );
        }
    }

    Ok(())
}
