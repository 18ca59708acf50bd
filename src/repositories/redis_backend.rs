use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::{AsyncCommands, RedisError};
use std::collections::HashMap;
use tracing::info;

use super::backend::{CartBackend, CommitOutcome, WatchSession};
use crate::models::{RepositoryError, RepositoryResult};

/// Redis / Valkey backend on a `deadpool-redis` connection pool
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        formatter
            .debug_struct("RedisBackend")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .finish()
    }
}

impl RedisBackend {
    /// Build a pool for `address`. Connections are opened lazily, so an
    /// unreachable server only surfaces on the first command.
    pub fn connect(address: &str, max_size: usize) -> RepositoryResult<Self> {
        let mut config = Config::from_url(address);
        config.pool = Some(PoolConfig::new(max_size));

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RepositoryError::ConnectionFailed {
                message: e.to_string(),
            })?;

        info!(max_size = max_size, "Created Redis connection pool");
        Ok(Self { pool })
    }

    async fn connection(&self) -> RepositoryResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| RepositoryError::ConnectionFailed {
                message: e.to_string(),
            })
    }
}

/// Map Redis client errors onto repository errors
fn map_redis_error(error: RedisError) -> RepositoryError {
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        RepositoryError::ConnectionFailed {
            message: error.to_string(),
        }
    } else {
        RepositoryError::Backend {
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl CartBackend for RedisBackend {
    type Session = RedisWatchSession;

    fn name(&self) -> &'static str {
        "redis"
    }

    async fn hget(&self, key: &str, field: &str) -> RepositoryResult<Option<String>> {
        let mut connection = self.connection().await?;
        connection.hget(key, field).await.map_err(map_redis_error)
    }

    async fn hgetall(&self, key: &str) -> RepositoryResult<HashMap<String, String>> {
        let mut connection = self.connection().await?;
        connection.hgetall(key).await.map_err(map_redis_error)
    }

    async fn hdel(&self, key: &str, field: &str) -> RepositoryResult<()> {
        let mut connection = self.connection().await?;
        let _: i64 = connection.hdel(key, field).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> RepositoryResult<()> {
        let mut connection = self.connection().await?;
        let _: i64 = connection.del(key).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn watch(&self, key: &str) -> RepositoryResult<Self::Session> {
        let mut connection = self.connection().await?;

        // A connection returned to the pool by a cancelled transaction may
        // still be watching another key
        let _: () = redis::pipe()
            .cmd("UNWATCH")
            .ignore()
            .cmd("WATCH")
            .arg(key)
            .ignore()
            .query_async(&mut connection)
            .await
            .map_err(map_redis_error)?;

        Ok(RedisWatchSession {
            connection,
            key: key.to_string(),
        })
    }
}

/// WATCH held on a leased pool connection; the lease is returned on drop
pub struct RedisWatchSession {
    connection: Connection,
    key: String,
}

#[async_trait]
impl WatchSession for RedisWatchSession {
    async fn hget(&mut self, field: &str) -> RepositoryResult<Option<String>> {
        self.connection
            .hget(&self.key, field)
            .await
            .map_err(map_redis_error)
    }

    async fn commit_hset(mut self, field: &str, value: &str) -> RepositoryResult<CommitOutcome> {
        // MULTI / HSET / EXEC in one round trip; EXEC replies nil when the
        // watched key was modified
        let reply: Option<(i64,)> = redis::pipe()
            .atomic()
            .hset(&self.key, field, value)
            .query_async(&mut self.connection)
            .await
            .map_err(map_redis_error)?;

        Ok(match reply {
            Some(_) => CommitOutcome::Committed,
            None => CommitOutcome::Aborted,
        })
    }
}
