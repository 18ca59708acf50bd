use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn, Instrument};

use super::backend::{CartBackend, CommitOutcome, WatchSession};
use crate::clock::Clock;
use crate::models::{
    Cart, CartItem, RepositoryError, RepositoryResult, RequestContext, StoredCartItem,
};
use crate::observability::{BackendTracingMiddleware, Metrics};

/// Data access for per-user carts
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Create or update an item's amount, keeping the creation time of an
    /// existing item
    async fn set_item(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        amount: i64,
    ) -> RepositoryResult<()>;

    /// The stored item, or the empty item when the user does not have it
    async fn get_item(&self, ctx: &RequestContext, product_id: &str) -> RepositoryResult<CartItem>;

    /// Remove an item; removing a missing item succeeds
    async fn delete_item(&self, ctx: &RequestContext, product_id: &str) -> RepositoryResult<()>;

    /// The whole cart, empty when the user has none
    async fn get_cart(&self, ctx: &RequestContext) -> RepositoryResult<Cart>;

    /// Remove the whole cart; clearing a missing cart succeeds
    async fn clear_cart(&self, ctx: &RequestContext) -> RepositoryResult<()>;
}

/// How many times an aborted transaction is attempted, and the linear
/// backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Commit once and give up on the first conflict
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(5))
    }
}

/// Cart store over any [`CartBackend`]: one hash per user, one field per
/// product, JSON encoded [`StoredCartItem`] values.
pub struct KvCartRepository<B: CartBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    retry: RetryPolicy,
    tracer: BackendTracingMiddleware,
}

impl<B: CartBackend> KvCartRepository<B> {
    pub fn new(backend: B, clock: Arc<dyn Clock>, key_prefix: impl Into<String>) -> Self {
        let tracer = BackendTracingMiddleware::new(backend.name(), None);
        Self {
            backend,
            clock,
            key_prefix: key_prefix.into(),
            retry: RetryPolicy::default(),
            tracer,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.tracer = BackendTracingMiddleware::new(self.backend.name(), Some(metrics));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend key holding a user's cart
    pub fn cart_key(&self, user_id: &str) -> String {
        format!("{}{}", self.key_prefix, user_id)
    }

    /// Client span for a single backend command
    fn create_backend_span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "KeyValueStore",
            "otel.kind" = "client",
            "otel.name" = %format!("{}.{}", self.backend.name(), operation),
            "db.system" = self.backend.name(),
            "db.operation" = operation,
            "db.key_prefix" = %self.key_prefix,
            "component" = "cart-repository",
        )
    }

    async fn traced<T, F>(&self, operation: &'static str, future: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        self.tracer
            .trace_operation(operation, future)
            .instrument(self.create_backend_span(operation))
            .await
    }

    /// One optimistic attempt: watch, read, merge, conditional commit
    async fn try_set_item(
        &self,
        key: &str,
        product_id: &str,
        amount: i64,
    ) -> RepositoryResult<CommitOutcome> {
        let mut session = self.traced("WATCH", self.backend.watch(key)).await?;

        let mut stored = match self.traced("HGET", session.hget(product_id)).await? {
            Some(raw) => StoredCartItem::decode(&raw)?,
            None => StoredCartItem::created_at(self.clock.now_micros()),
        };
        stored.amount = amount;
        let encoded = stored.encode()?;

        self.traced("EXEC", session.commit_hset(product_id, &encoded))
            .await
    }

    fn record_conflict(&self, retried: bool) {
        if let Some(metrics) = self.tracer.metrics() {
            metrics.record_transaction_conflict(retried);
        }
    }
}

#[async_trait]
impl<B: CartBackend> CartRepository for KvCartRepository<B> {
    #[instrument(skip(self, ctx, amount), fields(user_id = %ctx.user_id(), product_id = %product_id))]
    async fn set_item(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        amount: i64,
    ) -> RepositoryResult<()> {
        let key = self.cart_key(ctx.user_id());
        let mut attempt = 1;

        loop {
            let outcome = ctx
                .run(self.try_set_item(&key, product_id, amount))
                .await?;

            match outcome {
                CommitOutcome::Committed => {
                    info!(attempt = attempt, "Cart item saved");
                    return Ok(());
                }
                CommitOutcome::Aborted if attempt < self.retry.max_attempts => {
                    self.record_conflict(true);
                    warn!(attempt = attempt, "Cart transaction aborted by a concurrent write, retrying");

                    let delay = self.retry.delay_for(attempt);
                    ctx.run(async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await?;
                    attempt += 1;
                }
                CommitOutcome::Aborted => {
                    self.record_conflict(false);
                    warn!(attempt = attempt, "Cart transaction attempts exhausted");
                    return Err(RepositoryError::Conflict { attempts: attempt });
                }
            }
        }
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), product_id = %product_id))]
    async fn get_item(&self, ctx: &RequestContext, product_id: &str) -> RepositoryResult<CartItem> {
        let key = self.cart_key(ctx.user_id());

        let raw = ctx
            .run(self.traced("HGET", self.backend.hget(&key, product_id)))
            .await?;

        match raw {
            Some(raw) => Ok(StoredCartItem::decode(&raw)?.into_item(product_id)),
            None => Ok(CartItem::empty(product_id)),
        }
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), product_id = %product_id))]
    async fn delete_item(&self, ctx: &RequestContext, product_id: &str) -> RepositoryResult<()> {
        let key = self.cart_key(ctx.user_id());

        ctx.run(self.traced("HDEL", self.backend.hdel(&key, product_id)))
            .await?;

        info!("Cart item deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    async fn get_cart(&self, ctx: &RequestContext) -> RepositoryResult<Cart> {
        let key = self.cart_key(ctx.user_id());

        let fields = ctx
            .run(self.traced("HGETALL", self.backend.hgetall(&key)))
            .await?;

        // A single undecodable item fails the whole read
        let mut cart = Cart::empty(ctx.user_id());
        for (product_id, raw) in fields {
            cart.insert(StoredCartItem::decode(&raw)?.into_item(product_id));
        }

        Ok(cart)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    async fn clear_cart(&self, ctx: &RequestContext) -> RepositoryResult<()> {
        let key = self.cart_key(ctx.user_id());

        ctx.run(self.traced("DEL", self.backend.del(&key))).await?;

        info!("Cart cleared");
        Ok(())
    }
}
