//! Contact domain model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Maximum number of contacts returned by a single list request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// A contact entry owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Contact {
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

/// Request payload for creating a contact.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateContactRequest {
    #[validate(length(min = 1, max = 50, message = "First name must be 1-50 characters"))]
    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 50, message = "Last name must be 1-50 characters"))]
    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub last_name: String,

    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 100, message = "Email must be at most 100 characters"))]
    pub email: String,

    #[validate(regex(
        path = *PHONE_REGEX,
        message = "Phone number must contain 7-20 digits, spaces, dashes or parentheses, with an optional leading +"
    ))]
    pub phone_number: String,

    #[validate(custom(function = "shared::validation::validate_birthday"))]
    pub birthday: NaiveDate,

    #[validate(length(max = 500, message = "Additional info must be at most 500 characters"))]
    pub additional_info: Option<String>,
}

/// Request payload for replacing a contact. Every field is required.
pub type UpdateContactRequest = CreateContactRequest;

lazy_static::lazy_static! {
    static ref PHONE_REGEX: regex::Regex =
        regex::Regex::new(r"^\+?[0-9 ()\-]{7,20}$").unwrap();
}

/// Query parameters for listing contacts.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListContactsQuery {
    #[serde(default)]
    #[validate(range(min = 0, message = "skip must be non-negative"))]
    pub skip: i64,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: i64,
}

fn default_limit() -> i64 {
    MAX_PAGE_SIZE
}

impl Default for ListContactsQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

/// Query parameters for contact search.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SearchContactsQuery {
    #[validate(length(min = 1, max = 100, message = "query must be 1-100 characters"))]
    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub query: String,
}

/// Response payload for contact operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ContactResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: NaiveDate,
    pub additional_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id,
            first_name: contact.first_name,
            last_name: contact.last_name,
            email: contact.email,
            phone_number: contact.phone_number,
            birthday: contact.birthday,
            additional_info: contact.additional_info,
            created_at: contact.created_at,
            updated_at: contact.updated_at,
        }
    }
}
