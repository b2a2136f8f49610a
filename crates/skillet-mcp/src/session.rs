//! Per-server MCP session.
//!
//! A session owns one transport plus the request bookkeeping around it:
//! monotonic request IDs, an in-flight table mapping IDs to response
//! channels, and a demux task that routes inbound frames to their
//! waiters. Sends are serialized by a call gate; on transports that
//! cannot interleave responses (stdio) the gate is held until the reply
//! arrives, on the others only across the write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::McpServerConfig;
use crate::error::{McpError, TransportError};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, ServerInfo, ToolInfo,
    MCP_PROTOCOL_VERSION,
};
use crate::transport::{self, Transport, TransportKind};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live transport.
    Disconnected,
    /// Transport open, handshake not finished.
    Connecting,
    /// Handshake complete, calls accepted.
    Ready,
    /// Closed on purpose; terminal.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
        })
    }
}

/// In-flight requests awaiting their response, keyed by request ID.
type PendingMap = Arc<SyncMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// A session with a single MCP server.
pub struct McpSession {
    /// Server name.
    name: String,
    /// Transport kind, fixed at connect time.
    kind: TransportKind,
    /// Write half of the transport.
    transport: Mutex<Box<dyn Transport>>,
    /// Current connection state.
    state: RwLock<ConnectionState>,
    /// In-flight table.
    pending: PendingMap,
    /// Serializes sends. Held across the response wait on transports
    /// that cannot pipeline.
    call_gate: Mutex<()>,
    /// Request ID counter.
    next_id: AtomicU64,
    /// Server info from the initialize handshake.
    server_info: RwLock<Option<ServerInfo>>,
    /// Tools cached from the last tools/list.
    tools: RwLock<Vec<ToolInfo>>,
    /// Per-request timeout.
    request_timeout: Duration,
    /// Demux task routing inbound frames.
    demux: SyncMutex<Option<JoinHandle<()>>>,
}

impl McpSession {
    /// Connect the transport and run the MCP handshake.
    ///
    /// On success the session is `Ready`. Handshake failures close the
    /// transport before returning.
    pub async fn connect(config: &McpServerConfig) -> Result<Arc<Self>, McpError> {
        debug!(
            server = %config.name,
            transport = %config.transport,
            "Connecting MCP session"
        );

        let (transport, inbound) = transport::connect(config).await?;
        let session = Self::with_transport(
            &config.name,
            transport,
            inbound,
            config.request_timeout(),
            ConnectionState::Connecting,
        );

        if let Err(e) = session.initialize().await {
            // Leave no half-open child process behind.
            let _ = session.close().await;
            return Err(e);
        }

        Ok(session)
    }

    /// Wrap an already-open transport. Used by `connect` and by tests
    /// that script the server side.
    pub(crate) fn with_transport(
        name: &str,
        transport: Box<dyn Transport>,
        inbound: mpsc::Receiver<String>,
        request_timeout: Duration,
        state: ConnectionState,
    ) -> Arc<Self> {
        let kind = transport.kind();
        let session = Arc::new(Self {
            name: name.to_string(),
            kind,
            transport: Mutex::new(transport),
            state: RwLock::new(state),
            pending: Arc::new(SyncMutex::new(HashMap::new())),
            call_gate: Mutex::new(()),
            next_id: AtomicU64::new(1),
            server_info: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            request_timeout,
            demux: SyncMutex::new(None),
        });
        session.spawn_demux(inbound);
        session
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the transport kind.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Get the current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Check if the session is ready for calls.
    pub async fn is_ready(&self) -> bool {
        *self.state.read().await == ConnectionState::Ready
    }

    /// Get the server info from the handshake.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    /// Get the tools cached from the last listing.
    pub async fn cached_tools(&self) -> Vec<ToolInfo> {
        self.tools.read().await.clone()
    }

    /// Spawn the task that routes inbound frames to their waiters.
    fn spawn_demux(self: &Arc<Self>, mut inbound: mpsc::Receiver<String>) {
        // Weak so the demux task never keeps the session alive by itself.
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let Some(session) = weak.upgrade() else { return };
                session.route_frame(&frame);
            }
            // Inbound stream ended: the server hung up.
            if let Some(session) = weak.upgrade() {
                session.mark_disconnected().await;
            }
        });
        *self.demux.lock() = Some(handle);
    }

    /// Match one inbound frame against the in-flight table.
    fn route_frame(&self, frame: &str) {
        let response: JsonRpcResponse = match serde_json::from_str(frame) {
            Ok(response) => response,
            Err(e) => {
                warn!(server = %self.name, error = %e, "Discarding unparseable frame");
                return;
            }
        };

        let Some(id) = response.id.as_ref().and_then(RequestId::as_u64) else {
            debug!(server = %self.name, "Ignoring server notification");
            return;
        };

        match self.pending.lock().remove(&id) {
            // Waiter may have timed out between removal and send; fine.
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                warn!(server = %self.name, id = id, "Response for unknown request ID");
            }
        }
    }

    /// Flip to disconnected and fail every in-flight request.
    async fn mark_disconnected(&self) {
        {
            let mut state = self.state.write().await;
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        // Dropping the senders wakes each waiter with a closed-channel
        // error.
        self.pending.lock().clear();
        warn!(server = %self.name, "MCP server connection lost");
    }

    /// Send a request and wait for its response.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, McpError>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let frame = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let response = if self.kind.supports_pipelining() {
            {
                let _gate = self.call_gate.lock().await;
                if let Err(e) = self.send_frame(&frame).await {
                    self.pending.lock().remove(&id);
                    return Err(e.into());
                }
            }
            self.await_response(id, rx).await?
        } else {
            // One in-flight request at a time on this transport.
            let _gate = self.call_gate.lock().await;
            if let Err(e) = self.send_frame(&frame).await {
                self.pending.lock().remove(&id);
                return Err(e.into());
            }
            self.await_response(id, rx).await?
        };

        if let Some(error) = response.error {
            return Err(McpError::ServerError {
                code: error.code,
                message: error.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| McpError::protocol("response missing result"))?;
        serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("malformed {} result: {}", method, e)))
    }

    async fn send_frame(&self, frame: &str) -> Result<(), TransportError> {
        let mut transport = self.transport.lock().await;
        transport.send(frame).await
    }

    async fn await_response(
        &self,
        id: u64,
        rx: oneshot::Receiver<JsonRpcResponse>,
    ) -> Result<JsonRpcResponse, McpError> {
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed.into()),
            Err(_) => {
                // Forget the request so a late reply is not misrouted.
                self.pending.lock().remove(&id);
                Err(McpError::Timeout(self.request_timeout.as_secs()))
            }
        }
    }

    /// Send a notification (no response expected).
    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<(), McpError>
    where
        P: serde::Serialize,
    {
        let notification = JsonRpcNotification::new(method, params);
        let frame = serde_json::to_string(&notification)?;
        let _gate = self.call_gate.lock().await;
        self.send_frame(&frame).await?;
        Ok(())
    }

    /// Run the initialize handshake.
    async fn initialize(&self) -> Result<(), McpError> {
        {
            let state = self.state.read().await;
            if *state != ConnectionState::Connecting {
                return Err(McpError::invalid_state("connecting", state.to_string()));
            }
        }

        debug!(server = %self.name, "Initializing MCP session");

        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;

        if result.protocol_version != MCP_PROTOCOL_VERSION {
            debug!(
                server = %self.name,
                version = %result.protocol_version,
                "Server speaks a different protocol revision"
            );
        }

        *self.server_info.write().await = Some(result.server_info.clone());

        self.notify::<()>("notifications/initialized", None).await?;

        *self.state.write().await = ConnectionState::Ready;

        info!(
            server = %self.name,
            server_name = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP session ready"
        );

        Ok(())
    }

    async fn ensure_ready(&self) -> Result<(), McpError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Ready {
            return Err(McpError::invalid_state("ready", state.to_string()));
        }
        Ok(())
    }

    /// List available tools, refreshing the cache.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        self.ensure_ready().await?;

        debug!(server = %self.name, "Listing tools");

        let result: ListToolsResult = self.request::<(), _>("tools/list", None).await?;
        *self.tools.write().await = result.tools.clone();

        debug!(
            server = %self.name,
            tool_count = result.tools.len(),
            "Listed tools"
        );

        Ok(result.tools)
    }

    /// Call a tool on the server.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_ready().await?;

        debug!(server = %self.name, tool = tool, "Calling tool");

        let params = CallToolParams {
            name: tool.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            warn!(server = %self.name, tool = tool, "Tool reported an error");
        }

        Ok(result)
    }

    /// Close the session. Idempotent.
    pub async fn close(&self) -> Result<(), McpError> {
        {
            let mut state = self.state.write().await;
            if *state == ConnectionState::Closed {
                return Ok(());
            }
            *state = ConnectionState::Closed;
        }

        debug!(server = %self.name, "Closing MCP session");

        if let Some(handle) = self.demux.lock().take() {
            handle.abort();
        }
        self.pending.lock().clear();

        let mut transport = self.transport.lock().await;
        transport.close().await?;

        info!(server = %self.name, "MCP session closed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Transport whose replies are computed from the sent frame.
    struct ScriptedTransport {
        reply_tx: mpsc::Sender<String>,
        script: fn(&Value) -> Option<Value>,
        connected: bool,
    }

    impl ScriptedTransport {
        fn new(script: fn(&Value) -> Option<Value>) -> (Self, mpsc::Receiver<String>) {
            let (reply_tx, inbound) = mpsc::channel(16);
            (
                Self {
                    reply_tx,
                    script,
                    connected: true,
                },
                inbound,
            )
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Stdio
        }

        async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
            let request: Value = serde_json::from_str(frame).map_err(|_| {
                TransportError::WriteError(std::io::Error::other("bad frame"))
            })?;
            if let Some(reply) = (self.script)(&request) {
                let _ = self.reply_tx.send(reply.to_string()).await;
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

    /// Script for a server with one trivial tool.
    fn echo_server(request: &Value) -> Option<Value> {
        let id = request.get("id")?.clone();
        match request["method"].as_str()? {
            "initialize" => Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "echo", "version": "0.1"}
                }
            })),
            "tools/list" => Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "tools": [{
                        "name": "echo",
                        "description": "Echo the input",
                        "inputSchema": {"type": "object"}
                    }]
                }
            })),
            "tools/call" => Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{
                        "type": "text",
                        "text": request["params"]["arguments"]["text"]
                    }],
                    "isError": false
                }
            })),
            _ => None,
        }
    }

    fn scripted_session(
        script: fn(&Value) -> Option<Value>,
        timeout: Duration,
    ) -> Arc<McpSession> {
        let (transport, inbound) = ScriptedTransport::new(script);
        McpSession::with_transport(
            "test",
            Box::new(transport),
            inbound,
            timeout,
            ConnectionState::Connecting,
        )
    }

    #[tokio::test]
    async fn test_handshake_reaches_ready() {
        let session = scripted_session(echo_server, Duration::from_secs(2));
        assert_eq!(session.state().await, ConnectionState::Connecting);

        session.initialize().await.unwrap();

        assert_eq!(session.state().await, ConnectionState::Ready);
        assert_eq!(session.server_info().await.unwrap().name, "echo");
    }

    #[tokio::test]
    async fn test_list_and_call_tool() {
        let session = scripted_session(echo_server, Duration::from_secs(2));
        session.initialize().await.unwrap();

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(session.cached_tools().await.len(), 1);

        let mut args = Map::new();
        args.insert("text".to_string(), json!("hello"));
        let result = session.call_tool("echo", args).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "hello");
    }

    #[tokio::test]
    async fn test_call_before_handshake_is_invalid_state() {
        let session = scripted_session(echo_server, Duration::from_secs(2));

        let result = session.call_tool("echo", Map::new()).await;
        assert!(matches!(result, Err(McpError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_server_error_response() {
        fn failing(request: &Value) -> Option<Value> {
            let id = request.get("id")?.clone();
            if request["method"] == "initialize" {
                return echo_server(request);
            }
            Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            }))
        }

        let session = scripted_session(failing, Duration::from_secs(2));
        session.initialize().await.unwrap();

        let result = session.list_tools().await;
        assert!(matches!(
            result,
            Err(McpError::ServerError { code: -32601, .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        fn mute(request: &Value) -> Option<Value> {
            if request["method"] == "initialize" {
                return echo_server(request);
            }
            None
        }

        let session = scripted_session(mute, Duration::from_millis(50));
        session.initialize().await.unwrap();

        let result = session.list_tools().await;
        assert!(matches!(result, Err(McpError::Timeout(_))));
        // The abandoned request must not linger in the in-flight table.
        assert!(session.pending.lock().is_empty());
    }

    /// Transport that swallows every frame; tests drive replies through
    /// an externally-held channel sender.
    struct SilentTransport {
        connected: bool,
    }

    #[async_trait]
    impl Transport for SilentTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Stdio
        }

        async fn send(&mut self, _frame: &str) -> Result<(), TransportError> {
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

    fn silent_session(timeout: Duration) -> (Arc<McpSession>, mpsc::Sender<String>) {
        let (reply_tx, inbound) = mpsc::channel(16);
        let session = McpSession::with_transport(
            "test",
            Box::new(SilentTransport { connected: true }),
            inbound,
            timeout,
            ConnectionState::Ready,
        );
        (session, reply_tx)
    }

    #[tokio::test]
    async fn test_unknown_id_is_dropped_and_real_reply_routed() {
        let (session, reply_tx) = silent_session(Duration::from_secs(2));

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.list_tools().await })
        };

        // Wait until the request is actually in flight.
        while session.pending.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        // A stray frame for an ID nobody asked for is logged and dropped.
        reply_tx
            .send(json!({"jsonrpc": "2.0", "id": 999, "result": {}}).to_string())
            .await
            .unwrap();
        reply_tx
            .send(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {"tools": []}
                })
                .to_string(),
            )
            .await
            .unwrap();

        let tools = call.await.unwrap().unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_fails_in_flight_requests() {
        let (session, reply_tx) = silent_session(Duration::from_secs(30));

        let call = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.list_tools().await })
        };

        while session.pending.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        // Dropping the only sender ends the demux loop, as EOF would.
        drop(reply_tx);

        let result = call.await.unwrap();
        assert!(matches!(
            result,
            Err(McpError::Transport(TransportError::ConnectionClosed))
        ));
        assert_eq!(session.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let session = scripted_session(echo_server, Duration::from_secs(2));
        session.initialize().await.unwrap();

        session.close().await.unwrap();
        assert_eq!(session.state().await, ConnectionState::Closed);
        session.close().await.unwrap();

        let result = session.list_tools().await;
        assert!(matches!(result, Err(McpError::InvalidState { .. })));
    }
}
