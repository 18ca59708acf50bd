use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One line of a user's cart
///
/// `added_at` travels as integer microseconds since the Unix epoch, `null`
/// when the item does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub amount: i64,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    pub added_at: Option<DateTime<Utc>>,
}

/// Representation of a cart item inside the per-user backend record.
///
/// The product id is the hash field, so only the amount and the creation
/// time are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCartItem {
    pub amount: i64,
    #[serde(default, with = "chrono::serde::ts_microseconds_option")]
    pub added_at: Option<DateTime<Utc>>,
}

/// A user's cart: items keyed by product id, no ordering
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cart {
    pub user_id: String,
    items: HashMap<String, CartItem>,
}

/// Request body for setting the amount of a cart item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCartItemRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCartItemResponse {
    pub product_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCartItemResponse {
    pub item: CartItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCartResponse {
    pub items: Vec<CartItem>,
}

impl CartItem {
    /// The zero value returned for a product the user does not have
    pub fn empty(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            amount: 0,
            added_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0 && self.added_at.is_none()
    }
}

impl StoredCartItem {
    /// A brand new item stamped with its creation time
    pub fn created_at(added_at: DateTime<Utc>) -> Self {
        Self {
            amount: 0,
            added_at: Some(added_at),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn into_item(self, product_id: impl Into<String>) -> CartItem {
        CartItem {
            product_id: product_id.into(),
            amount: self.amount,
            added_at: self.added_at,
        }
    }
}

impl Cart {
    /// An empty cart for a user
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            items: HashMap::new(),
        }
    }

    /// Insert an item, replacing any item with the same product id
    pub fn insert(&mut self, item: CartItem) {
        self.items.insert(item.product_id.clone(), item);
    }

    pub fn get(&self, product_id: &str) -> Option<&CartItem> {
        self.items.get(product_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<CartItem> {
        self.items.into_values().collect()
    }
}

impl From<Cart> for GetCartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            items: cart.into_items(),
        }
    }
}
