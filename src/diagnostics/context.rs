//! Per-request deadline and cancellation carried through the query path.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::QueryError;

/// Deadline plus cancellation signal for one request.
///
/// Clones share the same cancellation state.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RequestContext {
    /// A context without a deadline that only ends when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), QueryError> {
        if self.token.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(QueryError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `operation` until it finishes, the context is cancelled or the
    /// deadline passes, whichever comes first.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(QueryError::Cancelled),
            _ = deadline => Err(QueryError::DeadlineExceeded),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_context_fails_before_running() {
        let ctx = RequestContext::new();
        ctx.cancel();

        let mut ran = false;
        let result = ctx
            .run(async {
                ran = true;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(QueryError::Cancelled)));
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_immediately() {
        let ctx = RequestContext::with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(QueryError::DeadlineExceeded)));
        let result = ctx.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(QueryError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_in_flight_operation() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(QueryError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_operation() {
        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(QueryError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        let ctx = RequestContext::with_timeout(Duration::MAX);
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.run(async { Ok("done") }).await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
    }
}
