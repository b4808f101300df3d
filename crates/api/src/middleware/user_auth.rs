//! User JWT authentication middleware.
//!
//! Resolves the bearer access token to a user and stores it in request
//! extensions as [`CurrentUser`] for handlers and later middleware.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

/// Bearer token from the `Authorization` header, if well formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// Middleware that requires a valid access token.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return ApiError::Unauthorized("Not authenticated".into()).into_response();
    };

    match state.auth.current_user(&token).await {
        Ok(user) => {
            tracing::Span::current().record("user_id", tracing::field::display(user.id));
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Access token rejected");
            ApiError::from(e).into_response()
        }
    }
}
