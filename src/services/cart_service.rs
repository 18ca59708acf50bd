use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::models::{
    error_codes, Cart, CartItem, RepositoryError, RequestContext, ServiceError, ServiceResult,
};
use crate::observability::Metrics;
use crate::repositories::CartRepository;

/// Cart business rules on top of the cart store
pub struct CartService {
    cart_repository: Arc<dyn CartRepository>,
    metrics: Option<Arc<Metrics>>,
}

impl CartService {
    pub fn new(cart_repository: Arc<dyn CartRepository>) -> Self {
        Self {
            cart_repository,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the amount of an item. A positive amount creates or updates the
    /// item, zero or less removes it. Returns the product id.
    #[instrument(skip(self, ctx, amount), fields(user_id = %ctx.user_id(), product_id = %product_id))]
    pub async fn set_cart_item(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        amount: i64,
    ) -> ServiceResult<String> {
        let result = if amount <= 0 {
            self.remove_cart_item(ctx, product_id).await
        } else {
            self.upsert_cart_item(ctx, product_id, amount).await
        };
        self.record_operation("set_cart_item", result.is_ok());

        result.map(|()| product_id.to_string())
    }

    async fn remove_cart_item(&self, ctx: &RequestContext, product_id: &str) -> ServiceResult<()> {
        self.cart_repository
            .delete_item(ctx, product_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to remove cart item");
                ServiceError::invalid_argument(
                    error_codes::DELETE_CART_ITEM_FAILURE,
                    "failed to remove cart item",
                )
            })?;

        info!("Cart item removed");
        Ok(())
    }

    async fn upsert_cart_item(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        amount: i64,
    ) -> ServiceResult<()> {
        match self.cart_repository.set_item(ctx, product_id, amount).await {
            Ok(()) => {
                info!("Cart item updated");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "Cart item update lost to concurrent writes");
                Err(ServiceError::conflict(
                    error_codes::UPDATE_CART_ITEM_CONFLICT,
                    "cart item was modified concurrently",
                ))
            }
            Err(e) => {
                error!(error = %e, "Failed to update cart item");
                Err(ServiceError::internal(
                    error_codes::UPDATE_CART_ITEM_FAILURE,
                    "failed to update cart item",
                ))
            }
        }
    }

    /// A single item; a product the user does not have comes back empty
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), product_id = %product_id))]
    pub async fn get_cart_item(
        &self,
        ctx: &RequestContext,
        product_id: &str,
    ) -> ServiceResult<CartItem> {
        let result = self
            .cart_repository
            .get_item(ctx, product_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to get cart item");
                ServiceError::internal(error_codes::GET_CART_ITEM_FAILURE, "failed to get cart item")
            });
        self.record_operation("get_cart_item", result.is_ok());

        result
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn get_cart(&self, ctx: &RequestContext) -> ServiceResult<Cart> {
        let result = self.cart_repository.get_cart(ctx).await.map_err(|e| {
            error!(error = %e, "Failed to get cart");
            ServiceError::internal(error_codes::GET_CART_FAILURE, "failed to get cart")
        });
        self.record_operation("get_cart", result.is_ok());

        let cart = result?;
        info!(item_count = cart.len(), "Cart retrieved");
        Ok(cart)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn clear_cart(&self, ctx: &RequestContext) -> ServiceResult<()> {
        let result = self.cart_repository.clear_cart(ctx).await.map_err(|e| {
            error!(error = %e, "Failed to clear cart");
            ServiceError::internal(error_codes::DELETE_CART_FAILURE, "failed to delete cart")
        });
        self.record_operation("clear_cart", result.is_ok());

        result
    }

    fn record_operation(&self, operation: &str, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cart_operation(operation, success);
        }
    }
}
