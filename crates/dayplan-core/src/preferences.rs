//! Preference resolution: stored (or default) preferences merged with
//! per-run overrides, then validated.

use chrono::NaiveTime;
use thiserror::Error;

use dayplan_db::models::Preferences;

use crate::clock::hhmm;

/// Errors for a merged preference set that cannot be scheduled against.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error(
        "work_start ({}) must be before work_end ({}); run `dayplan prefs edit` to fix",
        hhmm(*start),
        hhmm(*end)
    )]
    InvertedWindow { start: NaiveTime, end: NaiveTime },

    #[error("max_block_minutes must be greater than zero; run `dayplan prefs edit` to fix")]
    ZeroMaxBlock,
}

/// Explicit per-run overrides. `None` keeps the stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreferenceOverrides {
    pub work_start: Option<NaiveTime>,
    pub work_end: Option<NaiveTime>,
    pub break_interval_minutes: Option<u32>,
    pub max_block_minutes: Option<u32>,
    pub deep_work_enabled: Option<bool>,
}

impl PreferenceOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Return `base` with every set override applied.
    pub fn apply(&self, base: Preferences) -> Preferences {
        Preferences {
            work_start: self.work_start.unwrap_or(base.work_start),
            work_end: self.work_end.unwrap_or(base.work_end),
            break_interval_minutes: self
                .break_interval_minutes
                .unwrap_or(base.break_interval_minutes),
            max_block_minutes: self.max_block_minutes.unwrap_or(base.max_block_minutes),
            deep_work_enabled: self.deep_work_enabled.unwrap_or(base.deep_work_enabled),
        }
    }
}

/// Check the consistency rules every resolved preference set must meet.
///
/// `break_interval_minutes >= 0` holds by construction (`u32`).
pub fn validate(prefs: &Preferences) -> Result<(), PreferenceError> {
    if prefs.work_start >= prefs.work_end {
        return Err(PreferenceError::InvertedWindow {
            start: prefs.work_start,
            end: prefs.work_end,
        });
    }
    if prefs.max_block_minutes == 0 {
        return Err(PreferenceError::ZeroMaxBlock);
    }
    Ok(())
}

/// Merge stored preferences (or the defaults) with `overrides` and validate.
pub fn resolve(
    stored: Option<Preferences>,
    overrides: &PreferenceOverrides,
) -> Result<Preferences, PreferenceError> {
    let merged = overrides.apply(stored.unwrap_or_default());
    validate(&merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn defaults_when_nothing_stored() {
        let prefs = resolve(None, &PreferenceOverrides::default()).unwrap();
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn stored_values_win_over_defaults() {
        let stored = Preferences {
            work_start: t(7, 0),
            work_end: t(15, 0),
            break_interval_minutes: 10,
            max_block_minutes: 45,
            deep_work_enabled: false,
        };
        assert_eq!(resolve(Some(stored), &PreferenceOverrides::default()).unwrap(), stored);
    }

    #[test]
    fn overrides_apply_field_by_field() {
        let overrides = PreferenceOverrides {
            work_end: Some(t(17, 0)),
            deep_work_enabled: Some(false),
            ..Default::default()
        };
        let prefs = resolve(None, &overrides).unwrap();
        assert_eq!(prefs.work_start, t(9, 0));
        assert_eq!(prefs.work_end, t(17, 0));
        assert!(!prefs.deep_work_enabled);
        assert_eq!(prefs.break_interval_minutes, 15);
        assert!(!overrides.is_empty());
        assert!(PreferenceOverrides::default().is_empty());
    }

    #[test]
    fn inverted_window_is_fatal() {
        let overrides = PreferenceOverrides {
            work_start: Some(t(18, 0)),
            work_end: Some(t(9, 0)),
            ..Default::default()
        };
        let err = resolve(None, &overrides).unwrap_err();
        assert_eq!(
            err,
            PreferenceError::InvertedWindow {
                start: t(18, 0),
                end: t(9, 0)
            }
        );
        assert!(err.to_string().contains("dayplan prefs edit"));
    }

    #[test]
    fn empty_window_is_fatal() {
        let overrides = PreferenceOverrides {
            work_start: Some(t(12, 0)),
            work_end: Some(t(12, 0)),
            ..Default::default()
        };
        assert!(resolve(None, &overrides).is_err());
    }

    #[test]
    fn zero_max_block_is_fatal() {
        let overrides = PreferenceOverrides {
            max_block_minutes: Some(0),
            ..Default::default()
        };
        assert_eq!(resolve(None, &overrides).unwrap_err(), PreferenceError::ZeroMaxBlock);
    }

    #[test]
    fn zero_break_interval_is_valid() {
        let overrides = PreferenceOverrides {
            break_interval_minutes: Some(0),
            ..Default::default()
        };
        assert_eq!(resolve(None, &overrides).unwrap().break_interval_minutes, 0);
    }
}
