//! User repository for database operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::UserEntity;
use crate::metrics::QueryTimer;

const USER_COLUMNS: &str = "id, username, email, password_hash, avatar, confirmed, \
                            refresh_token_hash, created_at, updated_at";

/// Repository for user-related database operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new UserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_id");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find a user by (already normalized) email address.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_email");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Create a new, unconfirmed user account.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        avatar: Option<&str>,
    ) -> Result<UserEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_user");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, avatar, confirmed)
            VALUES ($1, $2, $3, $4, false)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(avatar)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Store (or clear, with `None`) the hash of the user's current refresh token.
    pub async fn update_refresh_token(
        &self,
        user_id: Uuid,
        refresh_token_hash: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("update_user_refresh_token");
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(refresh_token_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Replace the stored refresh-token hash only if it still equals `expected`.
    ///
    /// Returns false when another request rotated the token first.
    pub async fn rotate_refresh_token(
        &self,
        user_id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("rotate_user_refresh_token");
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $1, updated_at = NOW()
            WHERE id = $2 AND refresh_token_hash = $3
            "#,
        )
        .bind(replacement)
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected() == 1)
    }

    /// Replace the user's password hash.
    pub async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("update_user_password_hash");
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|_| ())
    }

    /// Mark the user's email as confirmed.
    ///
    /// Returns true if the row changed, false if it was already confirmed or absent.
    pub async fn confirm_email(&self, email: &str) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("confirm_user_email");
        let result = sqlx::query(
            r#"
            UPDATE users
            SET confirmed = true, updated_at = NOW()
            WHERE email = $1 AND confirmed = false
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected() > 0)
    }

    /// Set the avatar URL and return the updated user.
    pub async fn update_avatar(
        &self,
        email: &str,
        avatar_url: &str,
    ) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("update_user_avatar");
        let result = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            UPDATE users
            SET avatar = $1, updated_at = NOW()
            WHERE email = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(avatar_url)
        .bind(email)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }
}
