use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::RepositoryResult;

/// Result of a conditional commit on a watched key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The watched key changed after it was watched; nothing was written
    Aborted,
}

/// Hash commands the cart store needs from a key-value engine.
///
/// Single commands run on any pooled connection. Optimistic transactions go
/// through [`CartBackend::watch`], which pins one connection for the lifetime
/// of the returned session.
#[async_trait]
pub trait CartBackend: Send + Sync + 'static {
    type Session: WatchSession;

    /// Short engine name used as a metric label and span attribute
    fn name(&self) -> &'static str;

    async fn hget(&self, key: &str, field: &str) -> RepositoryResult<Option<String>>;

    async fn hgetall(&self, key: &str) -> RepositoryResult<HashMap<String, String>>;

    async fn hdel(&self, key: &str, field: &str) -> RepositoryResult<()>;

    async fn del(&self, key: &str) -> RepositoryResult<()>;

    /// Lease a dedicated connection and add `key` to its watch set
    async fn watch(&self, key: &str) -> RepositoryResult<Self::Session>;
}

/// An open optimistic transaction on a single watched key.
///
/// Dropping a session without committing releases the connection and writes
/// nothing.
#[async_trait]
pub trait WatchSession: Send {
    async fn hget(&mut self, field: &str) -> RepositoryResult<Option<String>>;

    /// Set `field` to `value` only if the watched key is unchanged
    async fn commit_hset(self, field: &str, value: &str) -> RepositoryResult<CommitOutcome>;
}
