//! Common validation utilities.

use chrono::{Datelike, NaiveDate, Utc};
use validator::ValidationError;

/// Earliest birth year accepted for a contact.
const MIN_BIRTH_YEAR: i32 = 1900;

/// Validates that a string is not empty once surrounding whitespace is removed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates a username: 5 to 16 characters after trimming, since the
/// trimmed value is what gets stored.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.trim().chars().count();
    if !(5..=16).contains(&len) {
        let mut err = ValidationError::new("username_length");
        err.message = Some("Username must be 5-16 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a birthday lies between 1900-01-01 and today (UTC).
pub fn validate_birthday(date: &NaiveDate) -> Result<(), ValidationError> {
    validate_birthday_at(date, Utc::now().date_naive())
}

/// Same as [`validate_birthday`] with an explicit reference date.
pub fn validate_birthday_at(date: &NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if *date > today {
        let mut err = ValidationError::new("birthday_future");
        err.message = Some("Birthday cannot be in the future".into());
        return Err(err);
    }

    if date.year() < MIN_BIRTH_YEAR {
        let mut err = ValidationError::new("birthday_too_old");
        err.message = Some("Birthday cannot be before 1900".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a password: 6 to 64 characters, not all whitespace.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(6..=64).contains(&len) {
        let mut err = ValidationError::new("password_length");
        err.message = Some("Password must be between 6 and 64 characters".into());
        return Err(err);
    }
    if password.trim().is_empty() {
        let mut err = ValidationError::new("password_blank");
        err.message = Some("Password must not be blank".into());
        return Err(err);
    }
    Ok(())
}
