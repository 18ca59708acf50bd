use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::backend::{CartBackend, CommitOutcome, WatchSession};
use crate::models::RepositoryResult;

#[derive(Debug, Default)]
struct MemoryState {
    hashes: HashMap<String, HashMap<String, String>>,
    // Bumped on every modification of a key, never removed, so a watch taken
    // before a DEL still sees the change
    versions: HashMap<String, u64>,
}

impl MemoryState {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn touch(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        self.touch(key);
    }
}

/// Process-local backend with Redis hash and WATCH semantics.
///
/// Clones share the same data. Empty hashes disappear the way Redis removes
/// empty keys.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a raw field value, bypassing encoding
    pub fn insert_raw(&self, key: &str, field: &str, value: &str) {
        self.lock().hset(key, field, value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().hashes.contains_key(key)
    }

    /// Raw field value as stored
    pub fn raw_value(&self, key: &str, field: &str) -> Option<String> {
        self.lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned()
    }
}

#[async_trait]
impl CartBackend for InMemoryBackend {
    type Session = InMemoryWatchSession;

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn hget(&self, key: &str, field: &str) -> RepositoryResult<Option<String>> {
        Ok(self.raw_value(key, field))
    }

    async fn hgetall(&self, key: &str) -> RepositoryResult<HashMap<String, String>> {
        Ok(self.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> RepositoryResult<()> {
        let mut state = self.lock();
        let Some(hash) = state.hashes.get_mut(key) else {
            return Ok(());
        };

        if hash.remove(field).is_some() {
            if hash.is_empty() {
                state.hashes.remove(key);
            }
            state.touch(key);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> RepositoryResult<()> {
        let mut state = self.lock();
        if state.hashes.remove(key).is_some() {
            state.touch(key);
        }
        Ok(())
    }

    async fn watch(&self, key: &str) -> RepositoryResult<Self::Session> {
        let version = self.lock().version(key);
        Ok(InMemoryWatchSession {
            state: Arc::clone(&self.state),
            key: key.to_string(),
            version,
        })
    }
}

/// Watch on one key of an [`InMemoryBackend`]
#[derive(Debug)]
pub struct InMemoryWatchSession {
    state: Arc<Mutex<MemoryState>>,
    key: String,
    version: u64,
}

#[async_trait]
impl WatchSession for InMemoryWatchSession {
    async fn hget(&mut self, field: &str) -> RepositoryResult<Option<String>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .hashes
            .get(&self.key)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    async fn commit_hset(self, field: &str, value: &str) -> RepositoryResult<CommitOutcome> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.version(&self.key) != self.version {
            return Ok(CommitOutcome::Aborted);
        }

        state.hset(&self.key, field, value);
        Ok(CommitOutcome::Committed)
    }
}
