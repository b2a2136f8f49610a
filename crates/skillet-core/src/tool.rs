//! Tool descriptors and call outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorKind};

/// Description of a tool advertised by a tool server.
///
/// Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique on its server
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// JSON-Schema-like description of the accepted arguments
    pub parameter_schema: Value,
    /// Name of the server that owns the tool
    pub server_name: String,
}

impl ToolDescriptor {
    /// Create a descriptor.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            server_name: server_name.into(),
        }
    }

    /// Fully qualified `server/tool` name.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.server_name, self.name)
    }
}

/// Structured error carried inside a failed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Coarse classification
    pub kind: ErrorKind,
    /// Human-readable detail, enough to fix the input
    pub message: String,
}

impl ErrorDetail {
    /// Create an error detail.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for ErrorDetail {
    fn from(err: &Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Result of one tool call as seen by skills.
///
/// The client manager never raises past its boundary: transport, protocol
/// and validation failures all arrive here as `success: false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the call succeeded
    pub success: bool,
    /// Payload returned by the tool on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Structured error on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Wall-clock duration of the call in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolOutcome {
    /// Create a successful outcome.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms: 0,
        }
    }

    /// Create a failed outcome.
    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorDetail::new(kind, message)),
            duration_ms: 0,
        }
    }

    /// Create a failed outcome from a pipeline error.
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorDetail::from(err)),
            duration_ms: 0,
        }
    }

    /// Stamp the call duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Kind of the carried error, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Whether a retry-opted caller may try this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.error_kind(),
            Some(ErrorKind::Transport) | Some(ErrorKind::Timeout)
        )
    }
}
