#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use cart_rs::{
    handlers::{create_app, USER_ID_HEADER},
    repositories::{InMemoryBackend, KvCartRepository, RetryPolicy},
    services::CartService,
    ManualClock, Metrics,
};

pub const KEY_PREFIX: &str = "cart:";

/// The full application over an in-memory backend and a manual clock
pub struct TestEnvironment {
    pub app: Router,
    pub clock: ManualClock,
    pub backend: InMemoryBackend,
    pub metrics: Arc<Metrics>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let clock = ManualClock::at_epoch();
        let backend = InMemoryBackend::new();
        let metrics = Arc::new(Metrics::new().expect("Failed to create metrics"));

        let repository = KvCartRepository::new(backend.clone(), Arc::new(clock.clone()), KEY_PREFIX)
            .with_retry_policy(RetryPolicy::new(5, Duration::from_millis(1)))
            .with_metrics(metrics.clone());
        let cart_service =
            Arc::new(CartService::new(Arc::new(repository)).with_metrics(metrics.clone()));

        let app = create_app(cart_service, metrics.clone(), Duration::from_secs(5));

        Self {
            app,
            clock,
            backend,
            metrics,
        }
    }

    /// Send a request and decode the JSON response body (`Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(USER_ID_HEADER, user_id);
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    /// Set an item at the given clock time, expecting success
    pub async fn set_item_at(&self, millis: i64, user_id: &str, product_id: &str, amount: i64) {
        self.clock.set_millis(millis);
        let (status, body) = self
            .send(
                Method::PUT,
                &format!("/api/cart/items/{}", product_id),
                Some(user_id),
                Some(serde_json::json!({ "amount": amount })),
            )
            .await;

        assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
        assert_eq!(body["product_id"], product_id);
    }

    pub async fn get_item(&self, user_id: &str, product_id: &str) -> Value {
        let (status, body) = self
            .send(
                Method::GET,
                &format!("/api/cart/items/{}", product_id),
                Some(user_id),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
        body["item"].clone()
    }

    /// Cart items sorted by product id
    pub async fn get_cart(&self, user_id: &str) -> Vec<Value> {
        let (status, body) = self
            .send(Method::GET, "/api/cart", Some(user_id), None)
            .await;

        assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
        let mut items = body["items"].as_array().cloned().unwrap_or_default();
        items.sort_by(|a, b| {
            a["product_id"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["product_id"].as_str().unwrap_or_default())
        });
        items
    }

    pub fn cart_key(&self, user_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, user_id)
    }
}

/// Microseconds since the epoch for a millisecond timestamp
pub fn micros(millis: i64) -> i64 {
    millis * 1000
}
