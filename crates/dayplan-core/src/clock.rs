//! Time-of-day helpers shared by the normalizer, validator and scheduler.
//!
//! All scheduling happens within a single calendar day at minute
//! resolution. Arithmetic that would wrap past midnight returns `None`
//! instead of silently wrapping the way `NaiveTime + Duration` does.

use chrono::{NaiveTime, TimeDelta, Timelike};

/// Parse a strict `HH:MM` time (24-hour clock).
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Parse the time spellings a generation engine tends to produce:
/// `HH:MM`, `H:MM`, `HH:MM:SS`, `h:MM AM`, `h:MMpm`.
///
/// Seconds are truncated so every returned time sits on a minute boundary.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim().to_ascii_uppercase();
    if s.is_empty() {
        return None;
    }

    let parsed = if s.ends_with("AM") || s.ends_with("PM") {
        let (clock, meridiem) = s.split_at(s.len() - 2);
        let normalized = format!("{} {meridiem}", clock.trim_end());
        NaiveTime::parse_from_str(&normalized, "%I:%M %p").ok()
    } else {
        NaiveTime::parse_from_str(&s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
            .ok()
    };

    parsed.and_then(|t| t.with_second(0))
}

/// Add minutes to a time, returning `None` if the result crosses midnight.
pub fn add_minutes(time: NaiveTime, minutes: i64) -> Option<NaiveTime> {
    let (result, overflow) = time.overflowing_add_signed(TimeDelta::minutes(minutes));
    (overflow == 0).then_some(result)
}

/// Round a time up to the next whole minute (no-op on a minute boundary).
pub fn ceil_to_minute(time: NaiveTime) -> NaiveTime {
    let truncated = time
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time);
    if truncated == time {
        time
    } else {
        add_minutes(truncated, 1).unwrap_or(truncated)
    }
}

/// Format a time as `HH:MM`.
pub fn hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}
