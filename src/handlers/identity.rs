use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};
use serde_json::Value;
use tracing::warn;

use super::error_body;
use crate::models::error_codes;

/// Request header carrying the calling user's id
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, taken from the `x-user-id` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity(pub String);

impl UserIdentity {
    pub fn user_id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(user_id) => Ok(UserIdentity(user_id.to_string())),
            None => {
                warn!(path = %parts.uri.path(), "Request without user identity");
                Err((
                    StatusCode::UNAUTHORIZED,
                    error_body(error_codes::MISSING_USER_ID, "missing user id"),
                ))
            }
        }
    }
}
