use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::{RepositoryError, RepositoryResult};

/// Per-request values threaded through every service and repository call:
/// the calling user and an optional deadline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    user_id: String,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            deadline: None,
        }
    }

    /// Deadline `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run a backend future under the request deadline.
    ///
    /// When the deadline passes the future is dropped, which releases any
    /// connection it holds, and `RepositoryError::Timeout` is returned.
    pub async fn run<F, T>(&self, future: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, future).await {
                Ok(result) => result,
                Err(_) => Err(RepositoryError::Timeout),
            },
            None => future.await,
        }
    }
}
