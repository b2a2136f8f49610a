//! Multi-server MCP client manager.
//!
//! Owns one session per configured server, the sealed tool registry
//! built at startup, and the single choke point skills call tools
//! through. `call_tool` never raises past its boundary: every failure
//! comes back as a structured error outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use skillet_core::{ToolDescriptor, ToolOutcome};

use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::protocol::{CallToolResult, ToolContent};
use crate::registry::ToolRegistry;
use crate::session::{ConnectionState, McpSession};
use crate::transport::TransportKind;
use crate::validate::validate_arguments;

/// Status of one configured server, for display.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    /// Server name.
    pub name: String,
    /// Configured transport.
    pub transport: TransportKind,
    /// Current connection state.
    pub state: ConnectionState,
    /// Tools registered at startup.
    pub tool_count: usize,
}

/// Result of the startup connection pass.
#[derive(Debug, Default)]
pub struct InitReport {
    /// Servers that connected and listed their tools.
    pub connected: Vec<String>,
    /// Servers that could not be reached, with the reason.
    pub unavailable: Vec<(String, String)>,
}

impl InitReport {
    /// Whether any configured server failed to come up.
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }
}

/// Manager for all MCP server sessions.
pub struct McpClientManager {
    /// Server configurations by name.
    configs: HashMap<String, McpServerConfig>,
    /// Live sessions by name.
    sessions: RwLock<HashMap<String, Arc<McpSession>>>,
    /// Tools discovered during the startup pass.
    registry: ToolRegistry,
}

impl McpClientManager {
    /// Create a manager over the given server configurations.
    pub fn new(configs: Vec<McpServerConfig>) -> Self {
        let configs = configs
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();
        Self {
            configs,
            sessions: RwLock::new(HashMap::new()),
            registry: ToolRegistry::new(),
        }
    }

    /// Connect every configured server, list its tools and seal the
    /// registry.
    ///
    /// Unreachable servers degrade the report instead of failing it;
    /// they get a fresh connection attempt on first use. Calling this
    /// twice is an error.
    pub async fn initialize(&self) -> Result<InitReport, McpError> {
        if self.registry.is_sealed() {
            return Err(McpError::RegistrySealed);
        }

        let mut report = InitReport::default();
        let mut listings = Vec::new();

        let mut names: Vec<_> = self.configs.keys().cloned().collect();
        names.sort();

        for name in names {
            let config = &self.configs[&name];
            match McpSession::connect(config).await {
                Ok(session) => match session.list_tools().await {
                    Ok(tools) => {
                        info!(
                            server = %name,
                            tool_count = tools.len(),
                            "Connected to MCP server"
                        );
                        listings.push((name.clone(), tools));
                        self.sessions.write().await.insert(name.clone(), session);
                        report.connected.push(name);
                    }
                    Err(e) => {
                        warn!(server = %name, error = %e, "Connected but failed to list tools");
                        let _ = session.close().await;
                        report.unavailable.push((name, e.to_string()));
                    }
                },
                Err(e) => {
                    warn!(server = %name, error = %e, "Failed to connect to MCP server");
                    report.unavailable.push((name, e.to_string()));
                }
            }
        }

        self.registry.seal(listings)?;

        info!(
            connected = report.connected.len(),
            unavailable = report.unavailable.len(),
            tools = self.registry.len(),
            "MCP startup pass complete"
        );

        Ok(report)
    }

    /// Whether a server with this name is configured.
    pub fn has_server(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    /// The sealed tool registry.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// All tools registered at startup, sorted by qualified name.
    pub fn all_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.all().into_iter().cloned().collect()
    }

    /// Status of every configured server, sorted by name.
    pub async fn server_statuses(&self) -> Vec<ServerStatus> {
        let sessions = self.sessions.read().await;
        let mut statuses = Vec::with_capacity(self.configs.len());

        for (name, config) in &self.configs {
            let state = match sessions.get(name) {
                Some(session) => session.state().await,
                None => ConnectionState::Disconnected,
            };
            statuses.push(ServerStatus {
                name: name.clone(),
                transport: config.transport,
                state,
                tool_count: self.registry.for_server(name).len(),
            });
        }

        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Invoke a tool on a server.
    ///
    /// Arguments are validated against the tool's schema before any
    /// transport I/O; a server that was down at startup gets exactly one
    /// reconnect attempt. The outcome always carries a duration and, on
    /// failure, a structured error instead of a propagated one.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> ToolOutcome {
        let started = Instant::now();
        let outcome = match self.call_tool_inner(server, tool, arguments).await {
            Ok(result) => ToolOutcome::ok(extract_data(&result)),
            Err(e) => {
                let error: skillet_core::Error = e.into();
                debug!(
                    server = server,
                    tool = tool,
                    error = %error,
                    "Tool call failed"
                );
                ToolOutcome::from_error(&error)
            }
        };
        outcome.with_duration(started.elapsed().as_millis() as u64)
    }

    async fn call_tool_inner(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        if !self.configs.contains_key(server) {
            return Err(McpError::ServerNotFound(server.to_string()));
        }

        // Schema known from startup discovery: invalid arguments must be
        // rejected before the transport is touched at all.
        let sealed_schema = self
            .registry
            .get(server, tool)
            .map(|d| d.parameter_schema.clone());
        if let Some(schema) = &sealed_schema {
            validate_arguments(tool, schema, &arguments)?;
        }

        let session = self.ensure_session(server).await?;

        if sealed_schema.is_none() {
            // Server came up after the registry was sealed; its live
            // listing is the only schema source.
            let cached = session.cached_tools().await;
            let schema = cached
                .iter()
                .find(|t| t.name == tool)
                .map(|t| t.input_schema.clone())
                .ok_or_else(|| McpError::ToolNotFound {
                    server: server.to_string(),
                    tool: tool.to_string(),
                })?;
            validate_arguments(tool, &schema, &arguments)?;
        }

        let result = session.call_tool(tool, arguments).await?;

        if result.is_error {
            let message = result.text();
            let message = if message.is_empty() {
                "tool returned an error result".to_string()
            } else {
                message
            };
            return Err(McpError::ToolFailed(message));
        }

        Ok(result)
    }

    /// Get the live session for a server, connecting on demand.
    ///
    /// A server that was unreachable before gets one fresh attempt per
    /// call; retry loops belong to the caller.
    async fn ensure_session(&self, server: &str) -> Result<Arc<McpSession>, McpError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(server) {
                if session.is_ready().await {
                    return Ok(Arc::clone(session));
                }
            }
        }

        let config = self
            .configs
            .get(server)
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;

        debug!(server = server, "Establishing MCP session on demand");

        let session = McpSession::connect(config).await?;
        if let Err(e) = session.list_tools().await {
            let _ = session.close().await;
            return Err(e);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(server) {
            if existing.is_ready().await {
                // Lost a reconnect race; keep the winner.
                let _ = session.close().await;
                return Ok(Arc::clone(existing));
            }
            let _ = existing.close().await;
        }
        sessions.insert(server.to_string(), Arc::clone(&session));

        Ok(session)
    }

    /// Close every session. Runs to completion even when some sessions
    /// fail to shut down; safe to call after a partial initialize, and
    /// again after that.
    pub async fn close(&self) {
        let sessions: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in sessions {
            if let Err(e) = session.close().await {
                error!(
                    server = %session.name(),
                    error = %e,
                    "Failed to close MCP session"
                );
            }
        }
    }
}

/// Distill a tool result into one JSON value.
///
/// A single text block that parses as JSON becomes that value; multiple
/// text blocks are joined with newlines; anything with non-text content
/// is passed through structurally.
fn extract_data(result: &CallToolResult) -> Value {
    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(ToolContent::as_text)
        .collect();

    if texts.len() == 1 {
        if let Ok(value) = serde_json::from_str::<Value>(texts[0]) {
            return value;
        }
    }

    if texts.len() == result.content.len() {
        return Value::String(texts.join("\n"));
    }

    serde_json::to_value(&result.content).unwrap_or(Value::Null)
}
