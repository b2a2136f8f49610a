//! Bounded retry for tool calls.
//!
//! The client manager performs exactly one attempt per call; skills
//! that want more opt in here with an explicit cap. Only transport and
//! timeout failures are retried, never validation or protocol errors.

use std::future::Future;

use tracing::warn;

use skillet_core::ToolOutcome;

/// Run a tool call up to `max_attempts` times.
///
/// Stops on the first success or non-retryable failure and returns the
/// last outcome. A cap of zero is treated as one attempt.
pub async fn with_retries<F, Fut>(max_attempts: u32, mut call: F) -> ToolOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ToolOutcome>,
{
    let max_attempts = max_attempts.max(1);
    let mut outcome = call().await;
    let mut attempt = 1;

    while attempt < max_attempts && !outcome.success && outcome.is_retryable() {
        warn!(
            attempt,
            max_attempts,
            error = ?outcome.error,
            "Retrying tool call"
        );
        outcome = call().await;
        attempt += 1;
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillet_core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_takes_one_attempt() {
        let attempts = AtomicU32::new(0);
        let outcome = with_retries(3, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { ToolOutcome::ok(json!("pong")) }
        })
        .await;

        assert!(outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_retries_to_cap() {
        let attempts = AtomicU32::new(0);
        let outcome = with_retries(3, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { ToolOutcome::err(ErrorKind::Transport, "connection refused") }
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_failure_is_never_retried() {
        let attempts = AtomicU32::new(0);
        let outcome = with_retries(5, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { ToolOutcome::err(ErrorKind::Validation, "missing field") }
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovery_mid_sequence() {
        let attempts = AtomicU32::new(0);
        let outcome = with_retries(3, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    ToolOutcome::err(ErrorKind::Timeout, "no response")
                } else {
                    ToolOutcome::ok(json!("recovered"))
                }
            }
        })
        .await;

        assert!(outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_cap_still_calls_once() {
        let attempts = AtomicU32::new(0);
        let outcome = with_retries(0, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { ToolOutcome::err(ErrorKind::Transport, "down") }
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
