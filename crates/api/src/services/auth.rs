//! Authentication service for registration, login, token rotation and
//! email confirmation.

use std::sync::Arc;

use domain::models::{SignupRequest, User};
use persistence::repositories::UserRepository;
use shared::crypto::{normalize_email, sha256_hex};
use shared::jwt::{JwtConfig, JwtError};
use shared::password::{hash_password, needs_rehash, verify_password, PasswordError};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::services::avatar::gravatar_url;
use crate::services::user_cache::UserCache;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Account already exists")]
    AccountExists,

    #[error("Invalid email")]
    InvalidEmail,

    #[error("Email not confirmed")]
    EmailNotConfirmed,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid token for email verification")]
    InvalidEmailToken,

    #[error("Verification error")]
    VerificationError,

    #[error("Could not validate credentials")]
    Unauthenticated,

    #[error("User not found")]
    UserNotFound,

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Freshly issued access and refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
}

impl ConfirmOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ConfirmOutcome::Confirmed => "Email confirmed",
            ConfirmOutcome::AlreadyConfirmed => "Your email is already confirmed",
        }
    }
}

/// What `request_email` decided to do.
#[derive(Debug, Clone)]
pub enum ResendOutcome {
    AlreadyConfirmed,
    /// The user exists and is unconfirmed; send them a new token.
    Send { user: User, token: String },
    /// Unknown address. Answered like `Send` so accounts cannot be enumerated.
    UnknownEmail,
}

/// Authentication service.
pub struct AuthService {
    users: UserRepository,
    jwt: Arc<JwtConfig>,
    cache: Option<Arc<UserCache>>,
    gravatar_size: u32,
}

impl AuthService {
    pub fn new(
        pool: PgPool,
        jwt: Arc<JwtConfig>,
        cache: Option<Arc<UserCache>>,
        gravatar_size: u32,
    ) -> Self {
        Self {
            users: UserRepository::new(pool),
            jwt,
            cache,
            gravatar_size,
        }
    }

    /// Register a new, unconfirmed user.
    pub async fn signup(&self, request: &SignupRequest) -> Result<User, AuthError> {
        let email = normalize_email(&request.email);

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::AccountExists);
        }

        let password_hash = hash_password(&request.password)?;
        let avatar = gravatar_url(&email, self.gravatar_size);

        let created = self
            .users
            .create_user(request.username.trim(), &email, &password_hash, Some(&avatar))
            .await;

        // concurrent signup with the same email
        let entity = match created {
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                return Err(AuthError::AccountExists)
            }
            other => other?,
        };

        metrics::counter!("user_signups_total").increment(1);
        info!(user_id = %entity.id, "User registered");

        Ok(entity.into())
    }

    /// Check credentials and issue a token pair. `email` is the login form's
    /// `username` field.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        let user: User = match self.users.find_by_email(&email).await? {
            Some(entity) => entity.into(),
            None => {
                metrics::counter!("auth_logins_total", "outcome" => "unknown_email").increment(1);
                return Err(AuthError::InvalidEmail);
            }
        };

        if !user.confirmed {
            metrics::counter!("auth_logins_total", "outcome" => "unconfirmed").increment(1);
            return Err(AuthError::EmailNotConfirmed);
        }

        if !verify_password(password, &user.password_hash)? {
            metrics::counter!("auth_logins_total", "outcome" => "bad_password").increment(1);
            return Err(AuthError::InvalidPassword);
        }

        if needs_rehash(&user.password_hash) {
            let rehashed = hash_password(password)?;
            self.users.update_password_hash(user.id, &rehashed).await?;
            info!(user_id = %user.id, "Password hash upgraded");
        }

        let tokens = self.issue_tokens(&user.email)?;
        self.users
            .update_refresh_token(user.id, Some(&sha256_hex(&tokens.refresh_token)))
            .await?;
        self.invalidate(&user.email);

        metrics::counter!("auth_logins_total", "outcome" => "success").increment(1);
        info!(user_id = %user.id, "User logged in");

        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Only the most recently issued refresh token is accepted. Presenting an
    /// older one revokes the stored token, forcing a fresh login.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .jwt
            .validate_refresh_token(refresh_token)
            .map_err(|_| AuthError::Unauthenticated)?;

        let user: User = self
            .users
            .find_by_email(&claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)?
            .into();

        let presented = sha256_hex(refresh_token);
        let Some(stored) = user.refresh_token_hash.as_deref() else {
            return Err(AuthError::InvalidRefreshToken);
        };

        if stored != presented {
            warn!(user_id = %user.id, "Refresh token reuse detected, revoking");
            self.users.update_refresh_token(user.id, None).await?;
            self.invalidate(&user.email);
            metrics::counter!("auth_refresh_reuse_total").increment(1);
            return Err(AuthError::InvalidRefreshToken);
        }

        let tokens = self.issue_tokens(&user.email)?;
        let rotated = self
            .users
            .rotate_refresh_token(user.id, &presented, &sha256_hex(&tokens.refresh_token))
            .await?;

        if !rotated {
            // another request rotated first with the same token
            warn!(user_id = %user.id, "Concurrent refresh token use, revoking");
            self.users.update_refresh_token(user.id, None).await?;
            self.invalidate(&user.email);
            return Err(AuthError::InvalidRefreshToken);
        }

        self.invalidate(&user.email);
        Ok(tokens)
    }

    /// Confirm the email address carried by an email token.
    pub async fn confirm_email(&self, token: &str) -> Result<ConfirmOutcome, AuthError> {
        let claims = self
            .jwt
            .validate_email_token(token)
            .map_err(|_| AuthError::InvalidEmailToken)?;

        let user = self
            .users
            .find_by_email(&claims.sub)
            .await?
            .ok_or(AuthError::VerificationError)?;

        if user.confirmed {
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }

        // false here means a parallel confirmation won
        if self.users.confirm_email(&user.email).await? {
            info!(user_id = %user.id, "Email confirmed");
        }
        self.invalidate(&user.email);

        Ok(ConfirmOutcome::Confirmed)
    }

    /// Decide whether a new verification email should go out.
    pub async fn request_email(&self, email: &str) -> Result<ResendOutcome, AuthError> {
        let email = normalize_email(email);

        match self.users.find_by_email(&email).await? {
            None => Ok(ResendOutcome::UnknownEmail),
            Some(user) if user.confirmed => Ok(ResendOutcome::AlreadyConfirmed),
            Some(user) => {
                let token = self.email_token_for(&user.email)?;
                Ok(ResendOutcome::Send {
                    user: user.into(),
                    token,
                })
            }
        }
    }

    /// Resolve the user behind an access token.
    pub async fn current_user(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self
            .jwt
            .validate_access_token(access_token)
            .map_err(|_| AuthError::Unauthenticated)?;

        if let Some(user) = self.cache.as_ref().and_then(|c| c.get(&claims.sub)) {
            metrics::counter!("user_cache_hits_total").increment(1);
            return Ok(user);
        }
        metrics::counter!("user_cache_misses_total").increment(1);

        let user: User = self
            .users
            .find_by_email(&claims.sub)
            .await?
            .ok_or(AuthError::Unauthenticated)?
            .into();

        if let Some(cache) = &self.cache {
            cache.insert(user.clone());
        }

        Ok(user)
    }

    /// Store a new avatar URL for the user and return the updated row.
    pub async fn update_avatar(&self, email: &str, avatar_url: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .update_avatar(email, avatar_url)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.invalidate(email);
        Ok(user.into())
    }

    pub fn email_token_for(&self, email: &str) -> Result<String, AuthError> {
        let (token, _jti) = self.jwt.generate_email_token(email)?;
        Ok(token)
    }

    fn issue_tokens(&self, email: &str) -> Result<TokenPair, AuthError> {
        let (access_token, _) = self.jwt.generate_access_token(email)?;
        let (refresh_token, _) = self.jwt.generate_refresh_token(email)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn invalidate(&self, email: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(email);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::jwt::{TokenLifetimes, DEFAULT_LEEWAY_SECS};

    fn service() -> AuthService {
        let jwt = JwtConfig::from_secret(
            "auth-service-test-secret",
            TokenLifetimes::default(),
            DEFAULT_LEEWAY_SECS,
        )
        .unwrap();
        // connect_lazy never touches the network until a query runs
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        AuthService::new(pool, Arc::new(jwt), None, 200)
    }

    #[test]
    fn test_confirm_outcome_messages() {
        assert_eq!(ConfirmOutcome::Confirmed.message(), "Email confirmed");
        assert_eq!(
            ConfirmOutcome::AlreadyConfirmed.message(),
            "Your email is already confirmed"
        );
    }

    #[tokio::test]
    async fn test_issue_tokens_have_distinct_types() {
        let svc = service();
        let pair = svc.issue_tokens("anna@example.com").unwrap();
        assert!(svc.jwt.validate_access_token(&pair.access_token).is_ok());
        assert!(svc.jwt.validate_refresh_token(&pair.refresh_token).is_ok());
        assert!(svc.jwt.validate_access_token(&pair.refresh_token).is_err());
    }

    #[tokio::test]
    async fn test_email_token_round_trip() {
        let svc = service();
        let token = svc.email_token_for("anna@example.com").unwrap();
        let claims = svc.jwt.validate_email_token(&token).unwrap();
        assert_eq!(claims.sub, "anna@example.com");
    }

    #[tokio::test]
    async fn test_current_user_rejects_refresh_token() {
        let svc = service();
        let pair = svc.issue_tokens("anna@example.com").unwrap();
        assert!(matches!(
            svc.current_user(&pair.refresh_token).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_confirm_rejects_access_token() {
        let svc = service();
        let pair = svc.issue_tokens("anna@example.com").unwrap();
        assert!(matches!(
            svc.confirm_email(&pair.access_token).await,
            Err(AuthError::InvalidEmailToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage() {
        let svc = service();
        assert!(matches!(
            svc.refresh("not-a-jwt").await,
            Err(AuthError::Unauthenticated)
        ));
    }
}
