use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use shared::jwt::JwtError;
use shared::password::PasswordError;

use crate::services::auth::AuthError;
use crate::services::avatar::AvatarError;
use crate::services::email::EmailError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Vec<ValidationDetail>,
    },

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Rate limited")]
    RateLimited { limit: u32, retry_after: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    /// Validation error without per-field details.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Maps an extractor rejection, keeping 413 and 415 and treating
    /// everything else as bad input.
    fn from_rejection(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(body),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => ApiError::UnsupportedMediaType(body),
            _ => ApiError::validation(body),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<ValidationDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let mut details = Vec::new();

        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Validation {
                message,
                details: fields,
            } => {
                details = fields;
                (StatusCode::BAD_REQUEST, "validation_error", message)
            }
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                msg,
            ),
            ApiError::RateLimited {
                limit,
                retry_after: secs,
            } => {
                retry_after = Some(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    format!("Rate limit of {} requests/minute exceeded", limit),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code,
            message,
            details,
            retry_after,
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => ApiError::Conflict("Resource already exists".into()),
                Some("23503") => ApiError::NotFound("Referenced resource not found".into()),
                _ => ApiError::Internal(format!("Database error: {}", db_err)),
            },
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is not reachable".into())
            }
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::Validation { message, details }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::from_rejection(err.status(), err.body_text())
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError(_) | JwtError::InvalidKey(_) | JwtError::UnsupportedAlgorithm(_) => {
                ApiError::Internal(err.to_string())
            }
            _ => ApiError::Unauthorized("Could not validate credentials".into()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccountExists => ApiError::Conflict(err.to_string()),
            AuthError::InvalidEmail
            | AuthError::EmailNotConfirmed
            | AuthError::InvalidPassword
            | AuthError::InvalidRefreshToken
            | AuthError::Unauthenticated => ApiError::Unauthorized(err.to_string()),
            AuthError::InvalidEmailToken => ApiError::Unprocessable(err.to_string()),
            AuthError::VerificationError => ApiError::BadRequest(err.to_string()),
            AuthError::UserNotFound => ApiError::NotFound(err.to_string()),
            AuthError::Token(e) => e.into(),
            AuthError::Password(e) => e.into(),
            AuthError::Database(e) => e.into(),
        }
    }
}

impl From<AvatarError> for ApiError {
    fn from(err: AvatarError) -> Self {
        match err {
            AvatarError::UnsupportedType(_) | AvatarError::TooLarge { .. } | AvatarError::Empty => {
                ApiError::BadRequest(err.to_string())
            }
            AvatarError::NotConfigured(_) | AvatarError::Io(_) | AvatarError::Upload(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::validation("x"), StatusCode::BAD_REQUEST),
            (ApiError::Unprocessable("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (
                ApiError::UnsupportedMediaType("x".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                ApiError::RateLimited {
                    limit: 10,
                    retry_after: 6,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_json_rejection_keeps_media_type_and_size_statuses() {
        use axum::{body::Body, extract::FromRequest, http::Request};

        let no_content_type = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("{}"))
            .unwrap();
        let rejection = Json::<serde_json::Value>::from_request(no_content_type, &())
            .await
            .unwrap_err();
        let response = ApiError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(response).await["error"], "unsupported_media_type");

        // past the extractor's default 2 MiB limit
        let oversized = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b' '; 3 * 1024 * 1024]))
            .unwrap();
        let rejection = Json::<serde_json::Value>::from_request(oversized, &())
            .await
            .unwrap_err();
        assert_eq!(
            ApiError::from(rejection).into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );

        let malformed = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{"))
            .unwrap();
        let rejection = Json::<serde_json::Value>::from_request(malformed, &())
            .await
            .unwrap_err();
        assert_eq!(
            ApiError::from(rejection).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_form_rejection_keeps_media_type_status() {
        use axum::{body::Body, extract::FromRequest, http::Request, Form};

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("username=a&password=b"))
            .unwrap();
        let rejection =
            Form::<std::collections::HashMap<String, String>>::from_request(request, &())
                .await
                .unwrap_err();
        assert_eq!(
            ApiError::from(rejection).into_response().status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }

    #[test]
    fn test_unauthorized_sets_www_authenticate() {
        let response = ApiError::Unauthorized("Invalid email".into()).into_response();
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            limit: 10,
            retry_after: 60,
        }
        .into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let response = ApiError::Internal("connection string leaked".into()).into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"], "internal_error");
        assert_eq!(json["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::NotFound("Contact not found".into()).into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["message"], "Contact not found");
        assert!(json.get("details").is_none());
    }

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 3, message = "too short"))]
        name: String,
        #[validate(email(message = "bad email"))]
        email: String,
    }

    #[tokio::test]
    async fn test_validation_errors_conversion() {
        let errors = Probe {
            name: "a".into(),
            email: "nope".into(),
        }
        .validate()
        .unwrap_err();

        let error = ApiError::from(errors);
        match &error {
            ApiError::Validation { message, details } => {
                assert_eq!(message, "2 validation errors");
                assert_eq!(details[0].field, "email");
                assert_eq!(details[1].message, "too short");
            }
            other => panic!("unexpected {other:?}"),
        }

        let json = body_json(error.into_response()).await;
        assert_eq!(json["details"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_single_validation_error_uses_field_message() {
        let errors = Probe {
            name: "abc".into(),
            email: "nope".into(),
        }
        .validate()
        .unwrap_err();

        match ApiError::from(errors) {
            ApiError::Validation { message, .. } => assert_eq!(message, "bad email"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sqlx_row_not_found() {
        assert!(matches!(
            ApiError::from(sqlx::Error::RowNotFound),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_auth_error_mapping() {
        let response = ApiError::from(AuthError::EmailNotConfirmed).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Email not confirmed");

        assert_eq!(
            ApiError::from(AuthError::AccountExists).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidEmailToken).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(AuthError::VerificationError).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_avatar_error_mapping() {
        assert!(matches!(
            ApiError::from(AvatarError::TooLarge { size: 3, max: 2 }),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(AvatarError::Upload("boom".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_jwt_errors_map_to_unauthorized() {
        assert!(matches!(
            ApiError::from(JwtError::TokenExpired),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(
            ApiError::from(JwtError::InvalidKey("bad".into())),
            ApiError::Internal(_)
        ));
    }
}
