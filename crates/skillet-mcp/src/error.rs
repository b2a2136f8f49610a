//! Error types for MCP communication.

use thiserror::Error;

/// Errors at the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to spawn MCP server process: {0}")]
    SpawnFailed(std::io::Error),

    #[error("Failed to write to MCP server: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to read from MCP server: {0}")]
    ReadError(std::io::Error),

    #[error("Connection to MCP server closed")]
    ConnectionClosed,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SSE handshake failed: {0}")]
    SseHandshake(String),
}

/// Errors at the MCP client layer.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Server '{0}' is not configured")]
    ServerNotFound(String),

    #[error("Tool '{tool}' not found on server '{server}'")]
    ToolNotFound { server: String, tool: String },

    #[error("Server returned error {code}: {message}")]
    ServerError { code: i64, message: String },

    #[error("Tool reported failure: {0}")]
    ToolFailed(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid connection state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Tool registry is already sealed")]
    RegistrySealed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an initialization error.
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<McpError> for skillet_core::Error {
    fn from(err: McpError) -> Self {
        match &err {
            McpError::Transport(_)
            | McpError::InvalidState { .. }
            | McpError::InitializationFailed(_) => skillet_core::Error::Transport(err.to_string()),
            McpError::Protocol(_) | McpError::ServerError { .. } | McpError::Json(_) => {
                skillet_core::Error::Protocol(err.to_string())
            }
            McpError::Validation(_)
            | McpError::ServerNotFound(_)
            | McpError::ToolNotFound { .. } => skillet_core::Error::Validation(err.to_string()),
            McpError::ToolFailed(msg) => skillet_core::Error::SkillExecution(msg.clone()),
            McpError::Timeout(secs) => {
                skillet_core::Error::Timeout(format!("no response after {}s", secs))
            }
            McpError::RegistrySealed => skillet_core::Error::Internal(err.to_string()),
        }
    }
}
