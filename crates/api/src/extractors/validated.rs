//! Body and query extractors that run `validator` rules and report every
//! failure as an [`ApiError`].

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Form, Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// JSON body, deserialized and validated.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Query string, deserialized and validated.
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        value.validate()?;
        Ok(ValidatedQuery(value))
    }
}

/// URL-encoded form body with rejections mapped to [`ApiError`].
#[derive(Debug, Clone, FromRequest)]
#[from_request(via(Form), rejection(ApiError))]
pub struct ApiForm<T>(pub T);

/// Path parameters with rejections mapped to [`ApiError`].
#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Named {
        #[validate(length(min = 2, message = "name too short"))]
        name: String,
    }

    fn json_request(body: &str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_validated_json_accepts_valid_body() {
        let ValidatedJson(named) =
            ValidatedJson::<Named>::from_request(json_request(r#"{"name":"ok"}"#), &())
                .await
                .unwrap();
        assert_eq!(named.name, "ok");
    }

    #[tokio::test]
    async fn test_validated_json_rejects_invalid_body() {
        let err = ValidatedJson::<Named>::from_request(json_request(r#"{"name":"x"}"#), &())
            .await
            .unwrap_err();
        match err {
            ApiError::Validation { message, .. } => assert_eq!(message, "name too short"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validated_json_rejects_malformed_body() {
        let err = ValidatedJson::<Named>::from_request(json_request("{"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_validated_query() {
        let (mut parts, _) = HttpRequest::builder()
            .uri("/?name=x")
            .body(())
            .unwrap()
            .into_parts();
        let err = ValidatedQuery::<Named>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }
}
