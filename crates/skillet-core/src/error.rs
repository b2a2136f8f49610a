//! Error types shared across the Skillet workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Arguments or input rejected before any I/O happened.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection or process failure talking to a tool server.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected response from a tool server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No response within the configured bound.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A skill failed while executing.
    #[error("Skill execution failed: {0}")]
    SkillExecution(String),

    /// Planning could not produce any skill invocation.
    #[error("Planning fallback failed: {0}")]
    PlanningFallback(String),

    /// The run was cancelled before it finished.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM endpoint failure.
    #[error("LLM error: {0}")]
    Llm(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a skill execution error.
    pub fn skill(msg: impl Into<String>) -> Self {
        Self::SkillExecution(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The serializable kind of this error, for outcome and debug surfaces.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::Transport(_) | Self::Io(_) => ErrorKind::Transport,
            Self::Protocol(_) | Self::Json(_) => ErrorKind::Protocol,
            Self::Timeout(_) | Self::Cancelled(_) => ErrorKind::Timeout,
            Self::SkillExecution(_) => ErrorKind::SkillExecution,
            Self::PlanningFallback(_) => ErrorKind::PlanningFallback,
            Self::Llm(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller that opted into retries may try again.
    ///
    /// Validation and protocol errors are never retryable; retrying them
    /// resends the same broken input. Cancellation is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_) | Self::Io(_))
    }
}

/// Coarse error classification carried on wire-facing surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    Protocol,
    Timeout,
    SkillExecution,
    PlanningFallback,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Timeout => "timeout",
            Self::SkillExecution => "skill_execution",
            Self::PlanningFallback => "planning_fallback",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
