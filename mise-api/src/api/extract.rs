//! Bearer token extractor
//!
//! Handlers that take an [`AuthUser`] argument require a valid
//! `Authorization: Bearer <token>` header naming an existing account.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;
use uuid::Uuid;

use crate::db::users;
use crate::error::ApiError;
use crate::models::User;
use crate::AppState;

const CREDENTIALS_REJECTED: &str = "Could not validate credentials";

/// The authenticated account behind the request
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

fn rejected() -> ApiError {
    ApiError::Unauthorized(CREDENTIALS_REJECTED.to_string())
}

/// Token part of an `Authorization` header value; scheme is case-insensitive
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(rejected)?;

        let claims = state.tokens.verify(token).map_err(|e| {
            debug!("Token rejected: {}", e);
            rejected()
        })?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| rejected())?;

        let user = users::find_by_id(&state.db, user_id)
            .await?
            .ok_or_else(rejected)?;

        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }
}
