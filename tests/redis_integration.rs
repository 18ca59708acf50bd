//! Cart store behaviour against a real Redis.
//!
//! Needs Docker; run with `cargo test --test redis_integration -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use cart_rs::{
    models::{RepositoryError, RequestContext},
    repositories::{
        CartBackend, CartRepository, CommitOutcome, KvCartRepository, RedisBackend, RetryPolicy,
        WatchSession,
    },
    services::CartService,
    ManualClock,
};
use chrono::{DateTime, Utc};
use testcontainers::clients::Cli;
use testcontainers_modules::redis::Redis;
use uuid::Uuid;

fn millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

fn unique_user() -> String {
    format!("user-{}", Uuid::new_v4())
}

fn repository(address: &str, clock: &ManualClock) -> KvCartRepository<RedisBackend> {
    let backend = RedisBackend::connect(address, 8).expect("Failed to create Redis pool");
    KvCartRepository::new(backend, Arc::new(clock.clone()), "cart:")
        .with_retry_policy(RetryPolicy::new(5, Duration::from_millis(2)))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cart_scenarios_against_redis() {
    let docker = Cli::default();
    let node = docker.run(Redis::default());
    let address = format!("redis://127.0.0.1:{}", node.get_host_port_ipv4(6379));

    let clock = ManualClock::at_epoch();
    let service = CartService::new(Arc::new(repository(&address, &clock)));
    let u1 = RequestContext::new(unique_user());
    let u2 = RequestContext::new(unique_user());

    let writes = [
        (1, &u1, "p1", 3),
        (2, &u1, "p2", 5),
        (3, &u1, "p1", 7),
        (4, &u2, "p1", 5),
        (5, &u1, "p3", 10),
        (6, &u1, "p3", 0),
    ];
    for (at, ctx, product_id, amount) in writes {
        clock.set_millis(at);
        service.set_cart_item(ctx, product_id, amount).await.unwrap();
    }

    let cart = service.get_cart(&u1).await.unwrap();
    assert_eq!(cart.len(), 2);
    let p1 = cart.get("p1").unwrap();
    assert_eq!((p1.amount, p1.added_at), (7, millis(1)));
    let p2 = cart.get("p2").unwrap();
    assert_eq!((p2.amount, p2.added_at), (5, millis(2)));
    assert!(service.get_cart_item(&u1, "p3").await.unwrap().is_empty());

    service.clear_cart(&u1).await.unwrap();
    service.clear_cart(&u1).await.unwrap();
    assert!(service.get_cart(&u1).await.unwrap().is_empty());
    assert_eq!(service.get_cart(&u2).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_watch_detects_concurrent_write() {
    let docker = Cli::default();
    let node = docker.run(Redis::default());
    let address = format!("redis://127.0.0.1:{}", node.get_host_port_ipv4(6379));
    let backend = RedisBackend::connect(&address, 4).unwrap();
    let key = format!("cart:{}", unique_user());

    let mut session = backend.watch(&key).await.unwrap();
    assert_eq!(session.hget("p1").await.unwrap(), None);

    // Another connection modifies the key before the commit
    backend.del(&key).await.unwrap();
    let mut other = backend.watch(&key).await.unwrap();
    other.hget("p1").await.unwrap();
    assert_eq!(
        other.commit_hset("p1", r#"{"amount":1,"added_at":1000}"#).await.unwrap(),
        CommitOutcome::Committed
    );

    let outcome = session
        .commit_hset("p1", r#"{"amount":2,"added_at":2000}"#)
        .await
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Aborted);
    assert_eq!(
        backend.hget(&key, "p1").await.unwrap().as_deref(),
        Some(r#"{"amount":1,"added_at":1000}"#)
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_writers_keep_first_creation_time() {
    let docker = Cli::default();
    let node = docker.run(Redis::default());
    let address = format!("redis://127.0.0.1:{}", node.get_host_port_ipv4(6379));

    let clock = ManualClock::at_epoch();
    clock.set_millis(1);
    let repository = Arc::new(
        repository(&address, &clock).with_retry_policy(RetryPolicy::new(50, Duration::from_millis(1))),
    );
    let user_id = unique_user();

    let handles: Vec<_> = (1..=16)
        .map(|amount| {
            let repository = Arc::clone(&repository);
            let ctx = RequestContext::new(user_id.clone());
            tokio::spawn(async move { repository.set_item(&ctx, "p1", amount).await })
        })
        .collect();

    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) | Err(RepositoryError::Conflict { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let item = repository
        .get_item(&RequestContext::new(user_id), "p1")
        .await
        .unwrap();
    assert!((1..=16).contains(&item.amount));
    assert_eq!(item.added_at, millis(1));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_abandoned_watch_does_not_leak_into_next_lease() {
    let docker = Cli::default();
    let node = docker.run(Redis::default());
    let address = format!("redis://127.0.0.1:{}", node.get_host_port_ipv4(6379));
    // One connection, so every lease reuses it
    let backend = RedisBackend::connect(&address, 1).unwrap();
    let abandoned_key = format!("cart:{}", unique_user());
    let key = format!("cart:{}", unique_user());

    let seed = backend.watch(&abandoned_key).await.unwrap();
    seed.commit_hset("p1", r#"{"amount":1,"added_at":1000}"#)
        .await
        .unwrap();

    // Cancelled mid-transaction: the connection goes back still watching
    let session = backend.watch(&abandoned_key).await.unwrap();
    drop(session);
    // Dirty that watch with a write through the same connection
    backend.del(&abandoned_key).await.unwrap();

    let mut session = backend.watch(&key).await.unwrap();
    session.hget("p1").await.unwrap();
    let outcome = session
        .commit_hset("p1", r#"{"amount":2,"added_at":2000}"#)
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::Committed);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_timed_out_write_releases_connection() {
    let docker = Cli::default();
    let node = docker.run(Redis::default());
    let address = format!("redis://127.0.0.1:{}", node.get_host_port_ipv4(6379));

    let clock = ManualClock::at_epoch();
    clock.set_millis(1);
    let backend = RedisBackend::connect(&address, 1).unwrap();
    let repository = KvCartRepository::new(backend, Arc::new(clock.clone()), "cart:");
    let user_id = unique_user();

    // Warm the single pooled connection
    repository
        .get_cart(&RequestContext::new(user_id.clone()))
        .await
        .unwrap();

    for _ in 0..5 {
        let ctx = RequestContext::new(user_id.clone()).with_timeout(Duration::from_micros(1));
        match repository.set_item(&ctx, "p1", 9).await {
            Ok(()) | Err(RepositoryError::Timeout) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let ctx = RequestContext::new(user_id.clone()).with_timeout(Duration::from_secs(5));
    repository.set_item(&ctx, "p2", 3).await.unwrap();

    let cart = repository.get_cart(&ctx).await.unwrap();
    assert_eq!(cart.get("p2").map(|item| item.amount), Some(3));
    if let Some(item) = cart.get("p1") {
        assert_eq!(item.amount, 9);
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unreachable_backend_is_connection_failure() {
    let clock = ManualClock::at_epoch();
    let repository = repository("redis://127.0.0.1:1", &clock);

    let result = repository.get_cart(&RequestContext::new(unique_user())).await;
    assert!(matches!(result, Err(RepositoryError::ConnectionFailed { .. })));
}
