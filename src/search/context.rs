//! Per-request deadline and cancellation

use crate::search::error::{SearchError, SearchResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Deadline and cancellation token threaded through build, execute and
/// transform. Cloning shares the token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    deadline: Instant,
    budget: Duration,
    token: CancellationToken,
}

impl RequestContext {
    pub fn new(budget: Duration) -> Self {
        Self::with_token(budget, CancellationToken::new())
    }

    pub fn with_token(budget: Duration, token: CancellationToken) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            deadline: Instant::now() + budget,
            budget,
            token,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Guard that cancels the context when dropped (client went away)
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn timeout_error(&self) -> SearchError {
        SearchError::Timeout(self.budget.as_millis() as u64)
    }

    /// Check the context before starting more work
    pub fn check(&self) -> SearchResult<()> {
        if self.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if self.remaining().is_zero() {
            return Err(self.timeout_error());
        }
        Ok(())
    }

    /// Run `fut` until it completes, the deadline passes, or the token fires
    pub async fn run<F, T>(&self, fut: F) -> SearchResult<T>
    where
        F: Future<Output = SearchResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(SearchError::Cancelled),
            result = tokio::time::timeout_at(self.deadline, fut) => {
                result.unwrap_or_else(|_| Err(self.timeout_error()))
            }
        }
    }

    /// Sleep for `delay` unless cancelled first
    pub async fn sleep(&self, delay: Duration) -> SearchResult<()> {
        tokio::select! {
            _ = self.token.cancelled() => Err(SearchError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
