use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::{error_body, UserIdentity};
use crate::models::{
    ErrorKind, GetCartItemResponse, GetCartResponse, RequestContext, ServiceError,
    SetCartItemRequest, SetCartItemResponse,
};
use crate::services::CartService;

type ErrorResponse = (StatusCode, Json<Value>);

/// State for cart handlers
#[derive(Clone)]
pub struct CartHandlerState {
    pub cart_service: Arc<CartService>,
    pub request_timeout: Duration,
}

impl CartHandlerState {
    fn context(&self, identity: UserIdentity) -> RequestContext {
        RequestContext::new(identity.0).with_timeout(self.request_timeout)
    }
}

/// Cart routes; the caller is identified by the `x-user-id` header
pub fn create_cart_router(cart_service: Arc<CartService>, request_timeout: Duration) -> Router {
    let state = CartHandlerState {
        cart_service,
        request_timeout,
    };

    Router::new()
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route(
            "/api/cart/items/:product_id",
            put(set_cart_item).get(get_cart_item),
        )
        .with_state(state)
}

#[instrument(skip(state, identity, request), fields(user_id = %identity.user_id()))]
pub async fn set_cart_item(
    State(state): State<CartHandlerState>,
    identity: UserIdentity,
    Path(product_id): Path<String>,
    Json(request): Json<SetCartItemRequest>,
) -> Result<Json<SetCartItemResponse>, ErrorResponse> {
    let ctx = state.context(identity);

    let product_id = state
        .cart_service
        .set_cart_item(&ctx, &product_id, request.amount)
        .await
        .map_err(service_error_to_response)?;

    Ok(Json(SetCartItemResponse { product_id }))
}

#[instrument(skip(state, identity), fields(user_id = %identity.user_id()))]
pub async fn get_cart_item(
    State(state): State<CartHandlerState>,
    identity: UserIdentity,
    Path(product_id): Path<String>,
) -> Result<Json<GetCartItemResponse>, ErrorResponse> {
    let ctx = state.context(identity);

    let item = state
        .cart_service
        .get_cart_item(&ctx, &product_id)
        .await
        .map_err(service_error_to_response)?;

    Ok(Json(GetCartItemResponse { item }))
}

#[instrument(skip(state, identity), fields(user_id = %identity.user_id()))]
pub async fn get_cart(
    State(state): State<CartHandlerState>,
    identity: UserIdentity,
) -> Result<Json<GetCartResponse>, ErrorResponse> {
    let ctx = state.context(identity);

    let cart = state
        .cart_service
        .get_cart(&ctx)
        .await
        .map_err(service_error_to_response)?;

    Ok(Json(GetCartResponse::from(cart)))
}

#[instrument(skip(state, identity), fields(user_id = %identity.user_id()))]
pub async fn clear_cart(
    State(state): State<CartHandlerState>,
    identity: UserIdentity,
) -> Result<StatusCode, ErrorResponse> {
    let ctx = state.context(identity);

    state
        .cart_service
        .clear_cart(&ctx)
        .await
        .map_err(service_error_to_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Convert a service error into an HTTP status and JSON body
pub fn service_error_to_response(err: ServiceError) -> ErrorResponse {
    let status = match err.kind() {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, error_body(err.code(), &err.to_string()))
}
