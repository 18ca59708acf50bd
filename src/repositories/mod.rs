pub mod backend;
pub mod cart_repository;
pub mod memory_backend;
pub mod redis_backend;

pub use backend::{CartBackend, CommitOutcome, WatchSession};
pub use cart_repository::{CartRepository, KvCartRepository, RetryPolicy};
pub use memory_backend::{InMemoryBackend, InMemoryWatchSession};
pub use redis_backend::{RedisBackend, RedisWatchSession};

use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::config::BackendConfig;
use crate::models::{RepositoryError, RepositoryResult};
use crate::observability::Metrics;

/// Key-value engine selected by the scheme of the backend address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Memory,
}

impl BackendKind {
    /// A bare `host:port` is a Redis address
    pub fn from_address(address: &str) -> RepositoryResult<Self> {
        let scheme = address.split_once("://").map(|(scheme, _)| scheme);

        match scheme {
            None | Some("redis") | Some("rediss") | Some("redis+unix") | Some("unix") => {
                Ok(BackendKind::Redis)
            }
            Some("memory") => Ok(BackendKind::Memory),
            _ => Err(RepositoryError::ConnectionFailed {
                message: format!("Unsupported backend address scheme: {}", address),
            }),
        }
    }
}

/// Connection URL for a Redis address, adding the scheme to a bare `host:port`
fn redis_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

/// Build the cart store described by `config`
pub fn create_cart_repository(
    config: &BackendConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
) -> RepositoryResult<Arc<dyn CartRepository>> {
    let retry = RetryPolicy::new(config.transaction_max_attempts, config.transaction_backoff());

    let repository: Arc<dyn CartRepository> = match BackendKind::from_address(&config.address)? {
        BackendKind::Redis => {
            let backend = RedisBackend::connect(&redis_url(&config.address), config.pool_max_size)?;
            Arc::new(with_optional_metrics(
                KvCartRepository::new(backend, clock, config.key_prefix.clone())
                    .with_retry_policy(retry),
                metrics,
            ))
        }
        BackendKind::Memory => {
            info!("Using in-memory cart backend; carts are lost on restart");
            Arc::new(with_optional_metrics(
                KvCartRepository::new(InMemoryBackend::new(), clock, config.key_prefix.clone())
                    .with_retry_policy(retry),
                metrics,
            ))
        }
    };

    Ok(repository)
}

fn with_optional_metrics<B: CartBackend>(
    repository: KvCartRepository<B>,
    metrics: Option<Arc<Metrics>>,
) -> KvCartRepository<B> {
    match metrics {
        Some(metrics) => repository.with_metrics(metrics),
        None => repository,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::RequestContext;

    fn backend_config(address: &str) -> BackendConfig {
        BackendConfig {
            address: address.to_string(),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn test_backend_kind_from_address() {
        assert_eq!(
            BackendKind::from_address("redis://127.0.0.1:6379").unwrap(),
            BackendKind::Redis
        );
        assert_eq!(
            BackendKind::from_address("rediss://cache.internal:6380/0").unwrap(),
            BackendKind::Redis
        );
        assert_eq!(
            BackendKind::from_address("memory://").unwrap(),
            BackendKind::Memory
        );
        assert_eq!(
            BackendKind::from_address("127.0.0.1:6379").unwrap(),
            BackendKind::Redis
        );
        assert_eq!(
            BackendKind::from_address("valkey:6379").unwrap(),
            BackendKind::Redis
        );
        assert!(BackendKind::from_address("http://localhost").is_err());
    }

    #[test]
    fn test_redis_url_adds_scheme_to_bare_address() {
        assert_eq!(redis_url("valkey:6379"), "redis://valkey:6379");
        assert_eq!(redis_url("rediss://cache:6380/0"), "rediss://cache:6380/0");
    }

    #[tokio::test]
    async fn test_create_repository_from_bare_address() {
        // Pools connect lazily, so no server is needed
        let result =
            create_cart_repository(&backend_config("127.0.0.1:1"), Arc::new(SystemClock), None);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_create_memory_repository() {
        let repository =
            create_cart_repository(&backend_config("memory://"), Arc::new(SystemClock), None)
                .unwrap();
        let ctx = RequestContext::new("user-1");

        repository.set_item(&ctx, "product-1", 2).await.unwrap();
        assert_eq!(repository.get_cart(&ctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_repository_rejects_unknown_scheme() {
        let result =
            create_cart_repository(&backend_config("ftp://nowhere"), Arc::new(SystemClock), None);
        assert!(result.is_err());
    }
}
