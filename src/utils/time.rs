use chrono::{Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Today's date as seen on the wall clock of `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Monday of the calendar week before the one containing `today`.
///
/// Offers dated strictly before this day are purged on every update cycle.
pub fn monday_last_week(today: NaiveDate) -> NaiveDate {
    let days_since_monday = i64::from(today.weekday().num_days_from_monday());
    today - Duration::days(days_since_monday + 7)
}
