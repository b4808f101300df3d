//! Contact entity (database row mapping).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the contacts table.
#[derive(Debug, Clone, FromRow)]
pub struct ContactEntity {
    pub id: i64,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: NaiveDate,
    pub additional_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ContactEntity> for domain::models::Contact {
    fn from(entity: ContactEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            first_name: entity.first_name,
            last_name: entity.last_name,
            email: entity.email,
            phone_number: entity.phone_number,
            birthday: entity.birthday,
            additional_info: entity.additional_info,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_entity_into_domain() {
        let owner = Uuid::new_v4();
        let entity = ContactEntity {
            id: 42,
            user_id: owner,
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "ann@example.com".into(),
            phone_number: "5550001111".into(),
            birthday: NaiveDate::from_ymd_opt(1992, 3, 4).unwrap(),
            additional_info: Some("neighbour".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let contact: domain::models::Contact = entity.into();
        assert_eq!(contact.id, 42);
        assert_eq!(contact.user_id, owner);
        assert_eq!(contact.additional_info.as_deref(), Some("neighbour"));
    }
}
