//! Upcoming birthday calculation.
//!
//! Birthdays repeat yearly, so the window check works on the next
//! anniversary of the date rather than the stored year. A Feb 29 birthday
//! is celebrated on Feb 28 in non-leap years.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::Contact;

/// Size of the upcoming-birthday window, in days after today.
pub const UPCOMING_BIRTHDAY_DAYS: i64 = 7;

/// Returns the anniversary of `birthday` in `year`.
fn anniversary_in(birthday: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(birthday)
}

/// Returns the next occurrence of `birthday` on or after `today`.
pub fn next_birthday(birthday: NaiveDate, today: NaiveDate) -> NaiveDate {
    let this_year = anniversary_in(birthday, today.year());
    if this_year >= today {
        this_year
    } else {
        anniversary_in(birthday, today.year() + 1)
    }
}

/// Returns true when the next occurrence of `birthday` falls within
/// `[today, today + days]`, both ends inclusive.
pub fn is_birthday_within(birthday: NaiveDate, today: NaiveDate, days: i64) -> bool {
    next_birthday(birthday, today) <= today + Duration::days(days)
}

/// Filters contacts down to those with a birthday in the next `days` days,
/// ordered by how soon the birthday comes.
pub fn upcoming_birthdays(contacts: Vec<Contact>, today: NaiveDate, days: i64) -> Vec<Contact> {
    let mut upcoming: Vec<(NaiveDate, Contact)> = contacts
        .into_iter()
        .filter(|c| is_birthday_within(c.birthday, today, days))
        .map(|c| (next_birthday(c.birthday, today), c))
        .collect();

    upcoming.sort_by(|(a_date, a), (b_date, b)| a_date.cmp(b_date).then(a.id.cmp(&b.id)));
    upcoming.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn contact(id: i64, birthday: NaiveDate) -> Contact {
        Contact {
            id,
            user_id: Uuid::nil(),
            first_name: format!("First{id}"),
            last_name: format!("Last{id}"),
            email: format!("c{id}@example.com"),
            phone_number: "5551234567".into(),
            birthday,
            additional_info: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_next_birthday_later_this_year() {
        assert_eq!(next_birthday(date(1990, 8, 1), date(2024, 6, 15)), date(2024, 8, 1));
    }

    #[test]
    fn test_next_birthday_today() {
        assert_eq!(next_birthday(date(1990, 6, 15), date(2024, 6, 15)), date(2024, 6, 15));
    }

    #[test]
    fn test_next_birthday_already_passed() {
        assert_eq!(next_birthday(date(1990, 1, 3), date(2024, 6, 15)), date(2025, 1, 3));
    }

    #[test]
    fn test_next_birthday_leap_day() {
        assert_eq!(next_birthday(date(2000, 2, 29), date(2023, 2, 1)), date(2023, 2, 28));
        assert_eq!(next_birthday(date(2000, 2, 29), date(2024, 2, 1)), date(2024, 2, 29));
        assert_eq!(next_birthday(date(2000, 2, 29), date(2023, 3, 1)), date(2024, 2, 29));
    }

    #[test]
    fn test_window_is_inclusive() {
        let today = date(2024, 6, 15);
        assert!(is_birthday_within(date(1980, 6, 15), today, 7));
        assert!(is_birthday_within(date(1980, 6, 22), today, 7));
        assert!(!is_birthday_within(date(1980, 6, 23), today, 7));
        assert!(!is_birthday_within(date(1980, 6, 14), today, 7));
    }

    #[test]
    fn test_window_wraps_year_end() {
        let today = date(2024, 12, 28);
        assert!(is_birthday_within(date(1995, 1, 2), today, 7));
        assert!(is_birthday_within(date(1995, 12, 31), today, 7));
        assert!(!is_birthday_within(date(1995, 1, 5), today, 7));
    }

    #[test]
    fn test_upcoming_birthdays_sorted_by_next_date() {
        let today = date(2024, 12, 28);
        let contacts = vec![
            contact(1, date(1990, 1, 2)),
            contact(2, date(1985, 6, 1)),
            contact(3, date(1970, 12, 29)),
            contact(4, date(2001, 12, 28)),
        ];

        let ids: Vec<i64> = upcoming_birthdays(contacts, today, UPCOMING_BIRTHDAY_DAYS)
            .into_iter()
            .map(|c| c.id)
            .collect();

        assert_eq!(ids, vec![4, 3, 1]);
    }

    #[test]
    fn test_upcoming_birthdays_empty() {
        assert!(upcoming_birthdays(Vec::new(), date(2024, 1, 1), 7).is_empty());
    }
}
