//! User account domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Represents a user account in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)] // Never serialize password hash to API responses
    pub password_hash: String,
    pub avatar: Option<String>,
    pub confirmed: bool,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload for account registration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct SignupRequest {
    #[validate(custom(function = "shared::validation::validate_username"))]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 100, message = "Email must be at most 100 characters"))]
    pub email: String,

    #[validate(custom(function = "shared::validation::validate_password_strength"))]
    pub password: String,
}

/// Form payload for `POST /api/auth/login`.
///
/// The `username` field carries the account email, matching the OAuth2
/// password-grant form.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Email is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Request payload for re-sending the verification email.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RequestEmail {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            avatar: user.avatar,
            confirmed: user.confirmed,
            created_at: user.created_at,
        }
    }
}

/// Response for a successful signup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user: UserResponse,
    pub detail: String,
}

/// Access/refresh token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Single-message response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice_w".to_string(),
            email: SafeEmail().fake(),
            password_hash: "secret_hash".to_string(),
            avatar: Some("https://www.gravatar.com/avatar/abc".to_string()),
            confirmed: false,
            refresh_token_hash: Some("refresh_hash".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_secrets_not_serialized() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("secret_hash"));
        assert!(!json.contains("refresh_hash"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_user_response_from_user() {
        let user = sample_user();
        let response = UserResponse::from(user.clone());
        assert_eq!(response.id, user.id);
        assert_eq!(response.email, user.email);
        assert_eq!(response.avatar, user.avatar);
        assert!(!response.confirmed);
    }

    #[test]
    fn test_signup_request_valid() {
        let request = SignupRequest {
            username: "alice".to_string(),
            email: SafeEmail().fake(),
            password: "secret1".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_signup_request_username_bounds() {
        let mut request = SignupRequest {
            username: "abcd".to_string(),
            email: "a@example.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(request.validate().is_err());

        request.username = "a".repeat(17);
        assert!(request.validate().is_err());

        request.username = "     ".to_string();
        assert!(request.validate().is_err());

        // padding does not count towards the length
        request.username = "   ab   ".to_string();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("username"));
    }

    #[test]
    fn test_signup_request_invalid_email() {
        let request = SignupRequest {
            username: "alice".to_string(),
            email: "not-an-email".to_string(),
            password: "secret1".to_string(),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn test_signup_request_short_password() {
        let request = SignupRequest {
            username: "alice".to_string(),
            email: "a@example.com".to_string(),
            password: "123".to_string(),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn test_token_response_bearer() {
        let tokens = TokenResponse::bearer("a".into(), "r".into());
        let json = serde_json::to_value(&tokens).unwrap();
        assert_eq!(json["token_type"], "bearer");
        assert_eq!(json["access_token"], "a");
        assert_eq!(json["refresh_token"], "r");
    }

    #[test]
    fn test_request_email_validation() {
        assert!(RequestEmail {
            email: "x@example.com".into()
        }
        .validate()
        .is_ok());
        assert!(RequestEmail {
            email: "nope".into()
        }
        .validate()
        .is_err());
    }
}
