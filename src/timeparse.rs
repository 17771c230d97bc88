use std::sync::OnceLock;

use chrono::{DateTime, Local, Timelike};
use regex::Regex;

fn clock_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})\s*([AaPp][Mm])$").unwrap())
}

/// Parse a clock string like "8:00 AM" or "12:30 pm" into a 24-hour
/// (hour, minute) pair.
///
/// Accepts only `H:MM AM/PM` (one or two hour digits, exactly two minute
/// digits, optional whitespace before the case-insensitive meridiem).
/// The hour must be 1-12 and the minute below 60; anything else returns
/// `None` rather than an error so one bad entry never blocks the rest of
/// a schedule.
pub fn parse_time(time_str: &str) -> Option<(u32, u32)> {
    let caps = clock_pattern().captures(time_str.trim())?;

    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;

    if !(1..=12).contains(&hour) || minute >= 60 {
        return None;
    }

    let is_pm = caps[3].eq_ignore_ascii_case("pm");
    let hour24 = match (is_pm, hour) {
        (false, 12) => 0, // 12 AM is midnight
        (false, h) => h,
        (true, 12) => 12, // 12 PM is noon
        (true, h) => h + 12,
    };

    Some((hour24, minute))
}

/// Split a comma-separated pill schedule into its time tokens,
/// trimming whitespace and dropping empty entries.
pub fn schedule_tokens(schedule: &str) -> impl Iterator<Item = &str> {
    schedule.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Check whether `now` is at or past the given dose time today.
pub fn is_past_dose_time(now: &DateTime<Local>, hour: u32, minute: u32) -> bool {
    now.hour() > hour || (now.hour() == hour && now.minute() >= minute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_basic() {
        assert_eq!(parse_time("8:00 AM"), Some((8, 0)));
        assert_eq!(parse_time("9:30 AM"), Some((9, 30)));
        assert_eq!(parse_time("2:00 PM"), Some((14, 0)));
        assert_eq!(parse_time("11:45 PM"), Some((23, 45)));
    }

    #[test]
    fn test_parse_time_noon_and_midnight() {
        assert_eq!(parse_time("12:00 PM"), Some((12, 0)));
        assert_eq!(parse_time("12:30 AM"), Some((0, 30)));
        assert_eq!(parse_time("12:59 PM"), Some((12, 59)));
    }

    #[test]
    fn test_parse_time_whitespace_and_case() {
        assert_eq!(parse_time("  8:00 AM  "), Some((8, 0)));
        assert_eq!(parse_time("8:00AM"), Some((8, 0)));
        assert_eq!(parse_time("8:00 am"), Some((8, 0)));
        assert_eq!(parse_time("8:00 Pm"), Some((20, 0)));
    }

    #[test]
    fn test_parse_time_invalid() {
        assert_eq!(parse_time("garbage"), None);
        assert_eq!(parse_time(""), None);
        assert_eq!(parse_time("8:00"), None); // no meridiem
        assert_eq!(parse_time("8 AM"), None); // no minutes
        assert_eq!(parse_time("8:0 AM"), None); // one minute digit
        assert_eq!(parse_time("8:00 XM"), None);
        assert_eq!(parse_time("13:00 AM"), None); // hour out of 1-12
        assert_eq!(parse_time("0:30 AM"), None);
        assert_eq!(parse_time("8:60 PM"), None);
    }

    #[test]
    fn test_schedule_tokens() {
        let tokens: Vec<&str> = schedule_tokens("8:00 AM, 8:00 PM").collect();
        assert_eq!(tokens, vec!["8:00 AM", "8:00 PM"]);

        let tokens: Vec<&str> = schedule_tokens(" 9:30 AM ,, ").collect();
        assert_eq!(tokens, vec!["9:30 AM"]);

        assert_eq!(schedule_tokens("").count(), 0);
    }

    #[test]
    fn test_is_past_dose_time() {
        let now = Local::now();
        assert!(is_past_dose_time(&now, 0, 0));
        assert!(!is_past_dose_time(&now, 23, 59) || (now.hour() == 23 && now.minute() == 59));
        assert!(is_past_dose_time(&now, now.hour(), now.minute()));
    }
}
