use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::{AgentError, AppError, DaemonError};
use crate::models::{Config, RequestParams, Response as GenerationResponse, RetrievalResults};
use crate::server::protocol::{
    AskRequest, IndexRequest, MAX_FRAME_LEN, RemoveRequest, Request, Response, RetrieveRequest,
    StatusResponse, SubmitRequest, decode_length, encode_message,
};
use crate::services::{DocumentSummary, GroundedAnswer, IndexReport};

pub struct DaemonClient {
    socket_path: PathBuf,
    auto_start: bool,
}

impl DaemonClient {
    pub fn new(config: &Config) -> Self {
        Self {
            socket_path: config.socket_path(),
            auto_start: config.daemon.auto_start,
        }
    }

    pub fn with_socket_path(mut self, socket_path: PathBuf) -> Self {
        self.socket_path = socket_path;
        self
    }

    pub fn is_running(&self) -> bool {
        self.socket_path.exists()
            && std::os::unix::net::UnixStream::connect(&self.socket_path).is_ok()
    }

    /// Whether CLI commands should go through the daemon.
    pub fn should_use(&self) -> bool {
        self.is_running() || self.auto_start
    }

    pub async fn ensure_running(&self) -> Result<(), DaemonError> {
        if self.is_running() {
            return Ok(());
        }

        if !self.auto_start {
            return Err(DaemonError::NotRunning);
        }

        self.start().await
    }

    /// Spawn a daemon regardless of `auto_start` and wait until it answers pings.
    pub async fn start(&self) -> Result<(), DaemonError> {
        self.spawn_daemon()?;
        self.wait_for_ready().await
    }

    /// Poll until the socket stops accepting connections.
    pub async fn wait_until_stopped(&self, max_wait: Duration) -> Result<(), DaemonError> {
        let deadline = std::time::Instant::now() + max_wait;
        while self.is_running() {
            if std::time::Instant::now() >= deadline {
                return Err(DaemonError::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    fn spawn_daemon(&self) -> Result<(), DaemonError> {
        let exe = std::env::current_exe().map_err(|e| DaemonError::SpawnError(e.to_string()))?;

        Command::new(&exe)
            .args(["serve", "--daemon"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|e| DaemonError::SpawnError(e.to_string()))?;

        Ok(())
    }

    async fn wait_for_ready(&self) -> Result<(), DaemonError> {
        let max_wait = Duration::from_secs(30);
        let check_interval = Duration::from_millis(100);
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if self.is_running() && self.ping().await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(check_interval).await;
        }

        Err(DaemonError::Timeout)
    }

    async fn connect(&self) -> Result<UnixStream, DaemonError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| DaemonError::ConnectionFailed(e.to_string()))
    }

    async fn send_request(&self, request: Request) -> Result<Response, DaemonError> {
        let mut stream = self.connect().await?;

        let encoded =
            encode_message(&request).map_err(|e| DaemonError::ProtocolError(e.to_string()))?;

        stream
            .write_all(&encoded)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        let len = decode_length(&len_buf);
        if len > MAX_FRAME_LEN {
            return Err(DaemonError::ProtocolError(format!(
                "response frame too large: {len} bytes"
            )));
        }
        let mut msg_buf = vec![0u8; len];

        stream
            .read_exact(&mut msg_buf)
            .await
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;

        serde_json::from_slice(&msg_buf).map_err(|e| DaemonError::ProtocolError(e.to_string()))
    }

    /// Send a request to a running (or auto-started) daemon.
    async fn call(&self, request: Request) -> Result<Response, DaemonError> {
        self.ensure_running().await?;
        self.send_request(request).await
    }

    pub async fn ping(&self) -> Result<(), DaemonError> {
        match self.send_request(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse, DaemonError> {
        match self.send_request(Request::Status).await? {
            Response::Status(s) => Ok(s),
            other => Err(unexpected(other)),
        }
    }

    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        match self.send_request(Request::Shutdown).await? {
            Response::ShutdownAck => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Submit a generation request. Generation failures come back as `AppError::Agent`.
    pub async fn submit(&self, params: RequestParams) -> Result<GenerationResponse, AppError> {
        let kind = params.kind();
        match self.call(Request::Submit(SubmitRequest { params })).await? {
            Response::Generated(response) => Ok(response),
            Response::Error(e) => Err(AgentError::new(e.kind.unwrap_or(kind), e.message).into()),
            other => Err(unexpected(other).into()),
        }
    }

    pub async fn index(&self, name: String, text: String) -> Result<IndexReport, DaemonError> {
        match self.call(Request::Index(IndexRequest { name, text })).await? {
            Response::Indexed(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResults, DaemonError> {
        let request = Request::Retrieve(RetrieveRequest {
            query: query.to_string(),
            k,
        });
        match self.call(request).await? {
            Response::Retrieved(results) => Ok(results),
            other => Err(unexpected(other)),
        }
    }

    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<GroundedAnswer, AppError> {
        let request = Request::Ask(AskRequest {
            question: question.to_string(),
            k,
        });
        match self.call(request).await? {
            Response::Answered(answer) => Ok(answer),
            Response::Error(e) => match e.kind {
                Some(kind) => Err(AgentError::new(kind, e.message).into()),
                None => Err(DaemonError::ProtocolError(e.message).into()),
            },
            other => Err(unexpected(other).into()),
        }
    }

    pub async fn documents(&self) -> Result<Vec<DocumentSummary>, DaemonError> {
        match self.call(Request::ListDocuments).await? {
            Response::Documents(list) => Ok(list.documents),
            other => Err(unexpected(other)),
        }
    }

    pub async fn remove_document(&self, document_id: &str) -> Result<usize, DaemonError> {
        let request = Request::RemoveDocument(RemoveRequest {
            document_id: document_id.to_string(),
        });
        match self.call(request).await? {
            Response::Removed(removed) => Ok(removed.chunks),
            other => Err(unexpected(other)),
        }
    }

    pub async fn clear(&self) -> Result<(), DaemonError> {
        match self.call(Request::Clear).await? {
            Response::Cleared => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> DaemonError {
    match response {
        Response::Error(e) => DaemonError::ProtocolError(e.message),
        _ => DaemonError::ProtocolError("unexpected response".to_string()),
    }
}

pub fn stop_daemon(config: &Config) -> Result<(), DaemonError> {
    let pid_path = config.pid_path();
    if !pid_path.exists() {
        return Err(DaemonError::NotRunning);
    }

    let pid_str = std::fs::read_to_string(&pid_path)?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .map_err(|_| DaemonError::ProtocolError("invalid pid file".to_string()))?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;
    }

    let _ = std::fs::remove_file(&pid_path);
    let _ = std::fs::remove_file(config.socket_path());

    Ok(())
}
