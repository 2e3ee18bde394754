//! Date argument resolution.
//!
//! Commands take an optional `--date`; when omitted they act on today.
//! Both `YYYY-MM-DD` and `YYYY/MM/DD` are accepted.

use anyhow::{Result, bail};
use chrono::NaiveDate;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a user-supplied date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return Ok(date);
        }
    }
    bail!("invalid date: {input:?} (expected YYYY-MM-DD or YYYY/MM/DD)")
}

/// The date a command operates on: the parsed `--date`, or `today`.
pub fn resolve_date(input: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match input {
        Some(s) => parse_date(s),
        None => Ok(today),
    }
}
