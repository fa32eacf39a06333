use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Utc};

use crate::contract::Frequency;

/// Naive UTC timestamp with microseconds, e.g. `2025-01-24T10:11:12.123456`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_LAYOUTS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses ISO-8601 text into a naive UTC instant. Offsets are converted to
/// UTC, naive values are taken as UTC and bare dates become midnight.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(aware) = DateTime::parse_from_rfc3339(text) {
        return Some(aware.naive_utc());
    }
    if let Ok(aware) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(aware.naive_utc());
    }
    let naive = text.strip_suffix('Z').unwrap_or(text);
    for layout in NAIVE_LAYOUTS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, layout) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(naive, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    parse_timestamp(text).map(|naive| naive.and_utc())
}

/// Calendar date of `YYYY-MM-DD` text, or of the date part of a timestamp.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(text).map(|at| at.date()))
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Biweekly tandas start on the 15th or on the last day of the month.
pub fn biweekly_start(today: NaiveDate) -> NaiveDate {
    let day = if today.day() <= 15 {
        15
    } else {
        last_day_of_month(today.year(), today.month())
    };
    today.with_day(day).unwrap_or(today)
}

/// Default start date for a new tanda created on `today`.
pub fn default_start_date(today: NaiveDate, frequency: Option<&Frequency>) -> NaiveDate {
    match frequency {
        Some(Frequency::Biweekly) => biweekly_start(today),
        _ => today,
    }
}

pub fn estimated_round_date(start: NaiveDate, frequency: Option<&Frequency>, round: u32) -> NaiveDate {
    let elapsed = u64::from(round.saturating_sub(1));
    let step_days = match frequency {
        Some(Frequency::Biweekly) => 14,
        Some(Frequency::Monthly) => 30,
        _ => 7,
    };
    start
        .checked_add_days(Days::new(elapsed * step_days))
        .unwrap_or(start)
}

/// Next occurrence of `birthday` on or after `today`. February 29 falls on
/// February 28 in common years.
pub fn next_birthday(birthday: NaiveDate, today: NaiveDate) -> NaiveDate {
    let this_year = anniversary(birthday, today.year());
    if this_year >= today {
        this_year
    } else {
        anniversary(birthday, today.year() + 1)
    }
}

fn anniversary(birthday: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, birthday.month(), birthday.day() - 1))
        .unwrap_or(birthday)
}
