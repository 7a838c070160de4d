//! Display helpers for durations kept in milliseconds, plus calendar checks used by readers.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use now::DateTimeNow;

/// Short form used in lists: `1h 1m`, `1m 5s` or `42s`.
pub fn format_time(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

/// Like [format_time] but keeps seconds when there are hours.
pub fn format_detailed_time(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{hours}h {}m {}s", minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

pub fn time_greeting<Tz: TimeZone>(now: &DateTime<Tz>) -> &'static str {
    match now.hour() {
        0..12 => "Good morning",
        12..17 => "Good afternoon",
        _ => "Good evening",
    }
}

/// Returns start of the day `date` falls in.
pub fn start_of_day<Tz: TimeZone>(date: &DateTime<Tz>) -> DateTime<Tz> {
    date.beginning_of_day()
}

/// Weeks start on Sunday.
pub fn start_of_week<Tz: TimeZone>(date: &DateTime<Tz>) -> DateTime<Tz> {
    let days_into_week = date.weekday().num_days_from_sunday() as i64;
    start_of_day(&(date.clone() - Duration::days(days_into_week)))
}

pub fn is_today<Tz: TimeZone>(timestamp: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
    timestamp.with_timezone(&now.timezone()).date_naive() == now.date_naive()
}

pub fn is_this_week<Tz: TimeZone>(timestamp: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
    timestamp >= start_of_week(now).with_timezone(&Utc)
}

/// Day label used as the key of per-date totals, e.g. `Thu Dec 25 2025`.
pub fn date_label<Tz: TimeZone>(timestamp: DateTime<Utc>, timezone: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp
        .with_timezone(timezone)
        .format("%a %b %d %Y")
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    #[test]
    fn format_time_picks_two_largest_units() {
        assert_eq!(format_time(65_000), "1m 5s");
        assert_eq!(format_time(3_661_000), "1h 1m");
        assert_eq!(format_time(999), "0s");
        assert_eq!(format_time(42_300), "42s");
    }

    #[test]
    fn detailed_time_keeps_seconds() {
        assert_eq!(format_detailed_time(3_661_000), "1h 1m 1s");
        assert_eq!(format_detailed_time(65_000), "1m 5s");
    }

    #[test]
    fn greeting_follows_hour() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let at = |h| Utc.from_utc_datetime(&day.and_hms_opt(h, 0, 0).unwrap());
        assert_eq!(time_greeting(&at(8)), "Good morning");
        assert_eq!(time_greeting(&at(12)), "Good afternoon");
        assert_eq!(time_greeting(&at(19)), "Good evening");
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2024-03-06 is a Wednesday.
        let wednesday = Utc.with_ymd_and_hms(2024, 3, 6, 15, 30, 0).unwrap();
        let start = start_of_week(&wednesday);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap());
        assert!(is_this_week(start, &wednesday));
        assert!(!is_this_week(start - Duration::seconds(1), &wednesday));
    }

    #[test]
    fn today_compares_calendar_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 0, 10, 0).unwrap();
        assert!(is_today(Utc.with_ymd_and_hms(2024, 3, 6, 23, 0, 0).unwrap(), &now));
        assert!(!is_today(Utc.with_ymd_and_hms(2024, 3, 5, 23, 59, 0).unwrap(), &now));
        assert_eq!(start_of_day(&now), Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap());
    }

    #[test]
    fn date_label_matches_dashboard_keys() {
        let ts = Utc.with_ymd_and_hms(2025, 12, 25, 10, 0, 0).unwrap();
        assert_eq!(date_label(ts, &Utc), "Thu Dec 25 2025");
    }
}
