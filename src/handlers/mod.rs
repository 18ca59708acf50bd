pub mod cart;
pub mod health;
pub mod identity;
pub mod metrics;

pub use cart::{create_cart_router, service_error_to_response, CartHandlerState};
pub use health::health_check;
pub use identity::{UserIdentity, USER_ID_HEADER};
pub use metrics::metrics_handler;

use axum::{middleware, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::observability::{observability_middleware, Metrics};
use crate::services::CartService;

/// JSON error body shared by every error response
pub(crate) fn error_body(code: &str, message: &str) -> Json<Value> {
    Json(json!({
        "code": code,
        "error": message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// The complete application: cart API, health and metrics endpoints, and
/// the request observability layer
pub fn create_app(
    cart_service: Arc<CartService>,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
) -> Router {
    let metrics_for_middleware = metrics.clone();

    Router::new()
        .route("/health/status", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
        .merge(create_cart_router(cart_service, request_timeout))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(move |req, next| {
            observability_middleware(metrics_for_middleware.clone(), req, next)
        }))
}
