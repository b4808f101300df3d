//! Contact repository for database operations.
//!
//! Every query is scoped by `user_id`; a contact that belongs to another user
//! is indistinguishable from one that does not exist.

use sqlx::PgPool;
use uuid::Uuid;

use domain::models::CreateContactRequest;

use crate::entities::ContactEntity;
use crate::metrics::QueryTimer;

/// Repository for contact-related database operations.
#[derive(Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

/// Escapes `LIKE` wildcards so user input is matched literally.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

impl ContactRepository {
    /// Creates a new ContactRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new contact owned by `user_id`.
    pub async fn create(
        &self,
        user_id: Uuid,
        input: &CreateContactRequest,
    ) -> Result<ContactEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_contact");
        let result = sqlx::query_as::<_, ContactEntity>(
            r#"
            INSERT INTO contacts (user_id, first_name, last_name, email, phone_number,
                                  birthday, additional_info)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(input.email.trim())
        .bind(input.phone_number.trim())
        .bind(input.birthday)
        .bind(input.additional_info.as_deref())
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find a single contact of the user.
    pub async fn find_by_id(
        &self,
        user_id: Uuid,
        contact_id: i64,
    ) -> Result<Option<ContactEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_contact_by_id");
        let result = sqlx::query_as::<_, ContactEntity>(
            "SELECT * FROM contacts WHERE id = $1 AND user_id = $2",
        )
        .bind(contact_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List the user's contacts, oldest first.
    pub async fn list(
        &self,
        user_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ContactEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_contacts");
        let result = sqlx::query_as::<_, ContactEntity>(
            r#"
            SELECT * FROM contacts
            WHERE user_id = $1
            ORDER BY id
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// All contacts of the user, unpaginated.
    pub async fn list_all(&self, user_id: Uuid) -> Result<Vec<ContactEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_all_contacts");
        let result = sqlx::query_as::<_, ContactEntity>(
            "SELECT * FROM contacts WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Replace every editable field of a contact.
    pub async fn update(
        &self,
        user_id: Uuid,
        contact_id: i64,
        input: &CreateContactRequest,
    ) -> Result<Option<ContactEntity>, sqlx::Error> {
        let timer = QueryTimer::new("update_contact");
        let result = sqlx::query_as::<_, ContactEntity>(
            r#"
            UPDATE contacts
            SET first_name = $3,
                last_name = $4,
                email = $5,
                phone_number = $6,
                birthday = $7,
                additional_info = $8,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(contact_id)
        .bind(user_id)
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(input.email.trim())
        .bind(input.phone_number.trim())
        .bind(input.birthday)
        .bind(input.additional_info.as_deref())
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete a contact and return the removed row.
    pub async fn delete(
        &self,
        user_id: Uuid,
        contact_id: i64,
    ) -> Result<Option<ContactEntity>, sqlx::Error> {
        let timer = QueryTimer::new("delete_contact");
        let result = sqlx::query_as::<_, ContactEntity>(
            "DELETE FROM contacts WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(contact_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Case-insensitive substring search over first name, last name and email.
    pub async fn search(
        &self,
        user_id: Uuid,
        query: &str,
    ) -> Result<Vec<ContactEntity>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(query.trim()));

        let timer = QueryTimer::new("search_contacts");
        let result = sqlx::query_as::<_, ContactEntity>(
            r#"
            SELECT * FROM contacts
            WHERE user_id = $1
              AND (first_name ILIKE $2 ESCAPE '\'
                   OR last_name ILIKE $2 ESCAPE '\'
                   OR email ILIKE $2 ESCAPE '\')
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_plain() {
        assert_eq!(escape_like("anna"), "anna");
    }

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
