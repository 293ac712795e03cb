//! context
//!
//! Cancellation and deadline propagation for provider calls.
//!
//! A [`CallContext`] is passed by reference from the caller through resource
//! handles and the paginator down to the transport. Cancelling its token, or
//! letting its deadline pass, aborts whatever is in flight: an HTTP attempt,
//! a backoff sleep, or the gap between two pages.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gitprovider::CallContext;
//!
//! let ctx = CallContext::new().with_timeout(Duration::from_secs(30));
//! assert!(ctx.deadline().is_some());
//!
//! let child = ctx.child();
//! ctx.cancel();
//! assert!(child.is_cancelled());
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Cancellation token plus an optional absolute deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing cancellation token (e.g. one tied to Ctrl-C).
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set a deadline `timeout` from now. An earlier existing deadline wins.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// A context cancelled together with this one, sharing its deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> Result<(), ProviderError> {
        if self.token.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ProviderError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context finishes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(ProviderError::DeadlineExceeded),
                    out = fut => out,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(ProviderError::Cancelled),
                    out = fut => out,
                }
            }
        }
    }

    /// Sleep for `duration`, waking early with an error if the context ends.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ProviderError> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_future_output() {
        let ctx = CallContext::new();
        let out = ctx.run(async { Ok::<_, ProviderError>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn cancelled_context_fails_before_running() {
        let ctx = CallContext::new();
        ctx.cancel();
        let err = ctx
            .run(async { Ok::<_, ProviderError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = ctx.sleep(Duration::from_secs(3600)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_sleep() {
        let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
        let err = ctx.sleep(Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, ProviderError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_wins() {
        let ctx = CallContext::new()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(50));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_secs(5));
    }

    #[test]
    fn child_follows_parent_cancellation() {
        let parent = CallContext::new();
        let first = parent.child();
        first.cancel();
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancel();
        assert!(second.is_cancelled());
    }
}
