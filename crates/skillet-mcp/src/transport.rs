//! MCP transport implementations.
//!
//! Three transports are supported: stdio (newline-delimited JSON over a
//! spawned subprocess), SSE (GET event stream plus per-request POSTs) and
//! plain HTTP (one POST per call). A transport exposes only its write
//! half; inbound frames arrive on the `mpsc` channel handed out at
//! connect time, so the session correlates responses the same way on all
//! three.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::McpServerConfig;
use crate::error::TransportError;
use crate::sse::SseParser;

/// Capacity of the inbound frame channel.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Bound on waiting for the SSE server's endpoint event.
const SSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Kind of transport a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Subprocess stdin/stdout, newline-framed JSON
    Stdio,
    /// Server-sent event stream with POSTed requests
    Sse,
    /// One HTTP request/response per call
    Http,
}

impl TransportKind {
    /// Whether concurrent in-flight requests may share the transport.
    ///
    /// stdio servers handle one call at a time; SSE and HTTP correlate
    /// concurrent responses by request ID.
    pub fn supports_pipelining(&self) -> bool {
        matches!(self, Self::Sse | Self::Http)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::Http => "http",
        })
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "http" | "streamable-http" => Ok(Self::Http),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// Write half of an MCP transport.
///
/// Inbound frames are delivered on the channel returned by the connect
/// function, pumped by a transport-owned background task (or, for HTTP,
/// pushed by `send` itself once the response body arrives).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which kind of transport this is.
    fn kind(&self) -> TransportKind;

    /// Send one JSON-RPC frame to the server.
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Close the transport, releasing the underlying resource.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Connect the transport described by a server config.
pub async fn connect(
    config: &McpServerConfig,
) -> Result<(Box<dyn Transport>, mpsc::Receiver<String>), TransportError> {
    match config.transport {
        TransportKind::Stdio => {
            let command = config.command.as_deref().ok_or_else(|| {
                TransportError::SpawnFailed(std::io::Error::other(
                    "stdio transport requires a command",
                ))
            })?;
            let (transport, inbound) = StdioTransport::spawn(
                command,
                &config.args,
                config.env.clone(),
                config.working_dir.as_ref(),
            )
            .await?;
            Ok((Box::new(transport), inbound))
        }
        TransportKind::Sse => {
            let url = config.url.as_deref().ok_or_else(|| {
                TransportError::SseHandshake("sse transport requires a url".to_string())
            })?;
            let (transport, inbound) = SseTransport::connect(url).await?;
            Ok((Box::new(transport), inbound))
        }
        TransportKind::Http => {
            let url = config.url.as_deref().ok_or_else(|| {
                TransportError::SpawnFailed(std::io::Error::other(
                    "http transport requires a url",
                ))
            })?;
            let (transport, inbound) = HttpTransport::new(url);
            Ok((Box::new(transport), inbound))
        }
    }
}

// ============================================================================
// Stdio
// ============================================================================

/// Standard I/O transport: a spawned child process speaking
/// newline-delimited JSON on its standard streams.
pub struct StdioTransport {
    /// The child process.
    child: Child,
    /// Stdin writer for sending messages.
    stdin: ChildStdin,
    /// Background task pumping stdout lines into the inbound channel.
    reader: JoinHandle<()>,
    /// Whether the transport is connected.
    connected: bool,
}

impl StdioTransport {
    /// Spawn a new stdio transport.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: HashMap<String, String>,
        working_dir: Option<&PathBuf>,
    ) -> Result<(Self, mpsc::Receiver<String>), TransportError> {
        debug!(command = command, args = ?args, "Spawning MCP server process");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let stderr pass through for debugging
            .kill_on_drop(true);

        for (key, value) in &env {
            cmd.env(key, value);
        }

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(TransportError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdin"))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdout"))
        })?;

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let reader = tokio::spawn(pump_stdout(BufReader::new(stdout), tx));

        debug!("MCP server process spawned");

        Ok((
            Self {
                child,
                stdin,
                reader,
                connected: true,
            },
            rx,
        ))
    }

    /// Get the process ID of the child process.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Forward stdout lines into the inbound channel until EOF.
async fn pump_stdout(mut stdout: BufReader<ChildStdout>, tx: mpsc::Sender<String>) {
    let mut line = String::new();
    loop {
        line.clear();
        match stdout.read_line(&mut line).await {
            Ok(0) => {
                debug!("MCP server closed stdout");
                break;
            }
            Ok(_) => {
                let frame = line.trim_end().to_string();
                if frame.is_empty() {
                    continue;
                }
                if tx.send(frame).await.is_err() {
                    // Session side is gone
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read from MCP server");
                break;
            }
        }
    }
    // Dropping tx closes the channel; the session sees the stream end.
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        debug!(frame = frame, "Sending frame to MCP server");

        self.stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(TransportError::WriteError)?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(TransportError::WriteError)?;
        self.stdin
            .flush()
            .await
            .map_err(TransportError::WriteError)?;

        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Ok(());
        }

        debug!("Closing MCP server transport");
        self.connected = false;

        if let Some(pid) = self.child.id() {
            debug!(pid = pid, "Terminating MCP server");

            // On Unix, send SIGTERM and give the server a moment before
            // killing it. On Windows, just kill.
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

                tokio::select! {
                    _ = self.child.wait() => {
                        debug!("MCP server exited gracefully");
                    }
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {
                        warn!("MCP server did not exit gracefully, killing");
                        let _ = self.child.kill().await;
                    }
                }
            }

            #[cfg(not(unix))]
            {
                let _ = self.child.kill().await;
            }
        }

        self.reader.abort();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // kill_on_drop terminates the child; stop the reader without
        // waiting for its EOF.
        self.reader.abort();
    }
}

// ============================================================================
// SSE
// ============================================================================

/// SSE transport: a long-lived GET stream for inbound frames, with
/// requests POSTed to the endpoint the server announces at handshake.
pub struct SseTransport {
    client: reqwest::Client,
    /// POST target announced by the server's endpoint event.
    post_url: String,
    /// Background task pumping message events into the inbound channel.
    stream_task: JoinHandle<()>,
    connected: bool,
}

impl SseTransport {
    /// Open the event stream and complete the endpoint handshake.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<String>), TransportError> {
        debug!(url = url, "Opening SSE stream");

        let client = reqwest::Client::new();
        let response = client
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::SseHandshake(format!(
                "server returned {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();

        // The server's first event names the URL requests are POSTed to.
        let endpoint = tokio::time::timeout(SSE_HANDSHAKE_TIMEOUT, async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(TransportError::Http)?;
                for event in parser.feed(&chunk) {
                    if event.is("endpoint") {
                        return Ok(event.data);
                    }
                }
            }
            Err(TransportError::SseHandshake(
                "stream ended before endpoint event".to_string(),
            ))
        })
        .await
        .map_err(|_| {
            TransportError::SseHandshake("timed out waiting for endpoint event".to_string())
        })??;

        let post_url = resolve_endpoint(url, &endpoint);
        debug!(post_url = %post_url, "SSE endpoint handshake complete");

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let stream_task = tokio::spawn(async move {
            let mut stream = stream;
            let mut parser = parser;
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => {
                        for event in parser.feed(&chunk) {
                            // Only message events (or untyped data) carry
                            // JSON-RPC frames.
                            if event.event.is_none() || event.is("message") {
                                if tx.send(event.data).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "SSE stream error");
                        break;
                    }
                }
            }
            debug!("SSE stream ended");
        });

        Ok((
            Self {
                client,
                post_url,
                stream_task,
                connected: true,
            },
            rx,
        ))
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let response = self
            .client
            .post(&self.post_url)
            .header("Content-Type", "application/json")
            .body(frame.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::WriteError(std::io::Error::other(format!(
                "POST returned {}",
                response.status()
            ))));
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.stream_task.abort();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.stream_task.abort();
    }
}

/// Resolve the endpoint announced by an SSE server against the stream URL.
fn resolve_endpoint(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    if let Some(path) = endpoint.strip_prefix('/') {
        // Absolute path: join with the origin of the stream URL.
        if let Some(scheme_end) = base.find("://") {
            let after_scheme = &base[scheme_end + 3..];
            let origin_end = after_scheme
                .find('/')
                .map(|i| scheme_end + 3 + i)
                .unwrap_or(base.len());
            return format!("{}/{}", &base[..origin_end], path);
        }
    }
    // Relative path: join with the stream URL's directory.
    match base.rfind('/') {
        Some(idx) if idx > base.find("://").map(|i| i + 2).unwrap_or(0) => {
            format!("{}/{}", &base[..idx], endpoint)
        }
        _ => format!("{}/{}", base.trim_end_matches('/'), endpoint),
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// HTTP transport: one POST per call. The response body is pushed onto
/// the inbound channel so correlation is uniform across transports.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    inbound: mpsc::Sender<String>,
    connected: bool,
}

impl HttpTransport {
    /// Create an HTTP transport for the given URL.
    pub fn new(url: impl Into<String>) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        (
            Self {
                client: reqwest::Client::new(),
                url: url.into(),
                inbound: tx,
                connected: true,
            },
            rx,
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(frame.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::WriteError(std::io::Error::other(format!(
                "POST returned {}",
                response.status()
            ))));
        }

        let body = response.text().await?;

        // Notifications get 202/empty replies; only forward real frames.
        if !body.trim().is_empty() && self.inbound.send(body).await.is_err() {
            return Err(TransportError::ConnectionClosed);
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
