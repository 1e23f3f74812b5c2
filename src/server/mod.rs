pub mod protocol;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{Config, Document};
use crate::server::protocol::{
    DocumentsResponse, MAX_FRAME_LEN, RemovedResponse, Request, Response, StatusResponse,
    decode_length, encode_message,
};
use crate::services::StudyAssistant;

/// How long in-flight connections get to write their replies after the queue drains.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// State shared by every connection task.
struct Shared {
    assistant: Arc<StudyAssistant>,
    last_request: RwLock<Instant>,
    requests_served: AtomicU64,
    shutdown: Notify,
}

pub struct DaemonServer {
    config: Config,
    socket_path: PathBuf,
    pid_path: PathBuf,
    shared: Arc<Shared>,
}

impl DaemonServer {
    pub fn new(config: Config, assistant: Arc<StudyAssistant>) -> Self {
        let socket_path = config.socket_path();
        let pid_path = config.pid_path();
        Self {
            config,
            socket_path,
            pid_path,
            shared: Arc::new(Shared {
                assistant,
                last_request: RwLock::new(Instant::now()),
                requests_served: AtomicU64::new(0),
                shutdown: Notify::new(),
            }),
        }
    }

    pub fn with_socket_path(mut self, socket_path: PathBuf) -> Self {
        self.socket_path = socket_path;
        self
    }

    pub fn with_pid_path(mut self, pid_path: PathBuf) -> Self {
        self.pid_path = pid_path;
        self
    }

    pub async fn run(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        self.write_pid_file()?;
        let mut terminate = signal(SignalKind::terminate())?;

        info!(socket = %self.socket_path.display(), "daemon listening");
        info!(
            idle_timeout_secs = self.config.daemon.idle_timeout_secs,
            "idle timeout"
        );

        let idle_timeout = Duration::from_secs(self.config.daemon.idle_timeout_secs);
        let check_interval = Duration::from_secs(10);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            *self.shared.last_request.write().await = Instant::now();
                            connections.spawn(handle_connection(self.shared.clone(), stream));
                        }
                        Err(e) => {
                            warn!("accept error: {}", e);
                        }
                    }
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("connection task failed: {}", e);
                    }
                }
                _ = tokio::time::sleep(check_interval) => {
                    let last = *self.shared.last_request.read().await;
                    let busy = self.shared.assistant.status().pending_requests > 0;
                    if !busy && last.elapsed() > idle_timeout {
                        info!("idle timeout reached, shutting down");
                        break;
                    }
                }
                _ = self.shared.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
                _ = terminate.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
            }
        }

        drop(listener);
        self.shared.assistant.shutdown().await;
        drain_connections(&mut connections).await;
        self.cleanup();
        Ok(())
    }

    fn write_pid_file(&self) -> Result<(), std::io::Error> {
        std::fs::write(&self.pid_path, std::process::id().to_string())
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(&self.pid_path);
        info!("daemon stopped");
    }
}

/// Let open connections write the replies the drained queue produced.
async fn drain_connections(connections: &mut JoinSet<()>) {
    if connections.is_empty() {
        return;
    }
    debug!(open = connections.len(), "waiting for connections to finish");
    let drained = tokio::time::timeout(DRAIN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            open = connections.len(),
            "connections still open after grace period, closing them"
        );
        connections.abort_all();
    }
}

async fn handle_connection(shared: Arc<Shared>, mut stream: UnixStream) {
    let mut len_buf = [0u8; 4];

    while stream.read_exact(&mut len_buf).await.is_ok() {
        let len = decode_length(&len_buf);
        if len > MAX_FRAME_LEN {
            warn!(len, "frame too large, closing connection");
            break;
        }

        let mut msg_buf = vec![0u8; len];
        if stream.read_exact(&mut msg_buf).await.is_err() {
            break;
        }

        let request: Request = match serde_json::from_slice(&msg_buf) {
            Ok(r) => r,
            Err(e) => {
                let response = Response::error(format!("invalid request: {}", e));
                if let Ok(encoded) = encode_message(&response) {
                    let _ = stream.write_all(&encoded).await;
                }
                continue;
            }
        };

        let response = handle_request(&shared, request).await;
        shared.requests_served.fetch_add(1, Ordering::Relaxed);
        *shared.last_request.write().await = Instant::now();

        if let Ok(encoded) = encode_message(&response)
            && stream.write_all(&encoded).await.is_err()
        {
            break;
        }

        if matches!(response, Response::ShutdownAck) {
            shared.shutdown.notify_one();
            break;
        }
    }
}

async fn handle_request(shared: &Shared, request: Request) -> Response {
    let assistant = &shared.assistant;
    match request {
        Request::Ping => Response::Pong,

        Request::Shutdown => Response::ShutdownAck,

        Request::Status => {
            let last = *shared.last_request.read().await;
            Response::Status(StatusResponse {
                running: true,
                pid: std::process::id(),
                idle_secs: last.elapsed().as_secs(),
                requests_served: shared.requests_served.load(Ordering::Relaxed),
                assistant: assistant.status(),
            })
        }

        Request::Submit(req) => {
            debug!(kind = %req.params.kind(), "submit");
            match assistant.submit_request(req.params).await {
                Ok(response) => Response::Generated(response),
                Err(e) => e.into(),
            }
        }

        Request::Index(req) => {
            let document = Document::new(req.name, req.text);
            match assistant.index_document(&document).await {
                Ok(report) => Response::Indexed(report),
                Err(e) => Response::error(AppError::from(e).to_string()),
            }
        }

        Request::Retrieve(req) => match assistant.search(&req.query, req.k).await {
            Ok(results) => Response::Retrieved(results),
            Err(e) => Response::error(AppError::from(e).to_string()),
        },

        Request::Ask(req) => match assistant.ask_notes(&req.question, req.k).await {
            Ok(answer) => Response::Answered(answer),
            Err(e) => e.into(),
        },

        Request::ListDocuments => Response::Documents(DocumentsResponse {
            documents: assistant.documents(),
        }),

        Request::RemoveDocument(req) => match assistant.remove_document(&req.document_id) {
            Ok(chunks) => Response::Removed(RemovedResponse { chunks }),
            Err(e) => Response::error(AppError::from(e).to_string()),
        },

        Request::Clear => match assistant.clear_index() {
            Ok(()) => Response::Cleared,
            Err(e) => Response::error(AppError::from(e).to_string()),
        },
    }
}

pub async fn run_daemon(config: Config) -> Result<(), AppError> {
    let assistant = Arc::new(StudyAssistant::from_config(&config)?);
    let server = DaemonServer::new(config, assistant);
    server
        .run()
        .await
        .map_err(|e| AppError::Daemon(e.into()))?;
    Ok(())
}
