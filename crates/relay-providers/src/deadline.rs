//! Per-call timeout merged with caller cancellation

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ProviderError;

/// Hard cap for one outbound call
///
/// The token is a child of the caller's token, so caller cancellation reaches
/// it while a timeout never cancels the caller. When the deadline passes the
/// token is cancelled so anything else observing it aborts too.
#[derive(Debug, Clone)]
pub struct CallDeadline {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl CallDeadline {
    pub fn new(timeout: Duration, external: Option<&CancellationToken>) -> Self {
        let token = external
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        Self {
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Run `fut` unless the deadline passes or the token is cancelled first
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.cancelled_error()),
            _ = tokio::time::sleep_until(self.deadline) => {
                self.token.cancel();
                Err(self.timeout_error())
            }
            out = fut => Ok(out),
        }
    }

    fn cancelled_error(&self) -> ProviderError {
        if self.is_expired() {
            self.timeout_error()
        } else {
            ProviderError::Cancelled
        }
    }

    fn timeout_error(&self) -> ProviderError {
        ProviderError::Timeout {
            message: format!("no complete response within {}ms", self.timeout.as_millis()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_before_deadline() {
        let deadline = CallDeadline::new(Duration::from_secs(5), None);
        let value = deadline.guard(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_and_cancels_token() {
        let deadline = CallDeadline::new(Duration::from_millis(50), None);
        let err = deadline
            .guard(tokio::time::sleep(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
        assert!(deadline.token().is_cancelled());

        // Later calls keep reporting the timeout, not a plain cancellation
        let err = deadline.guard(async {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_external_cancellation_wins() {
        let external = CancellationToken::new();
        let deadline = CallDeadline::new(Duration::from_secs(30), Some(&external));
        external.cancel();
        let err = deadline
            .guard(tokio::time::sleep(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_cancel_caller() {
        let external = CancellationToken::new();
        let deadline = CallDeadline::new(Duration::from_millis(10), Some(&external));
        let _ = deadline
            .guard(tokio::time::sleep(Duration::from_secs(1)))
            .await;
        assert!(deadline.token().is_cancelled());
        assert!(!external.is_cancelled());
    }
}
