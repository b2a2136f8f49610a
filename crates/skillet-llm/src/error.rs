//! LLM client errors.

use thiserror::Error;

/// Errors from chat completion calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Response contained no content")]
    EmptyResponse,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LlmError> for skillet_core::Error {
    fn from(err: LlmError) -> Self {
        match &err {
            LlmError::Http(e) if e.is_timeout() => skillet_core::Error::timeout(err.to_string()),
            _ => skillet_core::Error::Llm(err.to_string()),
        }
    }
}
