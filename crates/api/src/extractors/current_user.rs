//! Authenticated-user extractors.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::models::User;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::bearer_token;

/// The user behind the request's access token.
///
/// Taken from request extensions when `require_user_auth` already ran,
/// otherwise resolved from the `Authorization` header directly.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".into()))?;
        let user = state.auth.current_user(&token).await?;
        Ok(CurrentUser(user))
    }
}

/// Raw bearer token, used where the token is not an access token
/// (refresh endpoint).
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers)
            .map(BearerToken)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".into()))
    }
}
