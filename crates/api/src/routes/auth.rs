//! Account endpoints: signup, login, token refresh and email confirmation.

use axum::{
    extract::{Host, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use domain::models::{
    LoginForm, MessageResponse, RequestEmail, SignupRequest, SignupResponse, TokenResponse,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{ApiForm, ApiPath, BearerToken, ValidatedJson};
use crate::services::auth::ResendOutcome;

const SIGNUP_DETAIL: &str = "User successfully created. Check your email for confirmation.";
const CHECK_EMAIL: &str = "Check your email for confirmation.";

/// `POST /api/auth/signup`
pub async fn signup(
    State(state): State<AppState>,
    host: Option<Host>,
    ValidatedJson(request): ValidatedJson<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let user = state.auth.signup(&request).await?;

    let token = state.auth.email_token_for(&user.email)?;
    let base = state.email.link_base(host.as_ref().map(|Host(h)| h.as_str()));
    state.email.spawn_verification_email(
        user.email.clone(),
        user.username.clone(),
        base,
        token,
    );

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: user.into(),
            detail: SIGNUP_DETAIL.to_string(),
        }),
    ))
}

/// `POST /api/auth/login` with a url-encoded `username` (the email) and
/// `password`.
pub async fn login(
    State(state): State<AppState>,
    ApiForm(form): ApiForm<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    form.validate()?;
    let tokens = state.auth.login(&form.username, &form.password).await?;
    Ok(Json(TokenResponse::bearer(
        tokens.access_token,
        tokens.refresh_token,
    )))
}

/// `GET /api/auth/refresh_token` with the refresh token as bearer.
pub async fn refresh_token(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<TokenResponse>, ApiError> {
    let tokens = state.auth.refresh(&token).await?;
    Ok(Json(TokenResponse::bearer(
        tokens.access_token,
        tokens.refresh_token,
    )))
}

/// `GET /api/auth/confirmed_email/:token`
pub async fn confirmed_email(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let outcome = state.auth.confirm_email(&token).await?;
    Ok(Json(MessageResponse::new(outcome.message())))
}

/// `POST /api/auth/request_email`
pub async fn request_email(
    State(state): State<AppState>,
    host: Option<Host>,
    ValidatedJson(request): ValidatedJson<RequestEmail>,
) -> Result<Json<MessageResponse>, ApiError> {
    match state.auth.request_email(&request.email).await? {
        ResendOutcome::AlreadyConfirmed => Ok(Json(MessageResponse::new(
            "Your email is already confirmed",
        ))),
        ResendOutcome::Send { user, token } => {
            let base = state.email.link_base(host.as_ref().map(|Host(h)| h.as_str()));
            state
                .email
                .spawn_verification_email(user.email, user.username, base, token);
            Ok(Json(MessageResponse::new(CHECK_EMAIL)))
        }
        ResendOutcome::UnknownEmail => {
            tracing::debug!("Verification email requested for unknown address");
            Ok(Json(MessageResponse::new(CHECK_EMAIL)))
        }
    }
}
