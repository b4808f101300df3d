//! Domain services for the Contacts API.
//!
//! Services contain business logic that operates on domain models.

pub mod birthdays;

pub use birthdays::{is_birthday_within, next_birthday, upcoming_birthdays, UPCOMING_BIRTHDAY_DAYS};
