//! Caller identity
//!
//! Authentication happens upstream; the trusted proxy forwards the user id in
//! the `x-user-id` header. Browsers cannot set headers on an `EventSource`,
//! so a `user_id` query parameter is accepted as well.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use flashq_common::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated user id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(USER_ID_HEADER) {
            let value = value
                .to_str()
                .map_err(|_| ApiError::Unauthorized("malformed x-user-id header".to_string()))?;
            return parse_user_id(value).map(AuthUser);
        }

        let query = parts.uri.query().unwrap_or_default();
        let from_query = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "user_id")
            .map(|(_, value)| value);

        match from_query {
            Some(value) => parse_user_id(value).map(AuthUser),
            None => Err(ApiError::Unauthorized("missing user identity".to_string())),
        }
    }
}

fn parse_user_id(value: &str) -> Result<UserId, ApiError> {
    match value.trim().parse::<UserId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::Unauthorized(format!("invalid user id: {}", value))),
    }
}
