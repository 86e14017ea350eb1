//! Tick alignment and date evaluation
//!
//! Both policies are pure so they can be tested without a clock or a
//! remote site.

use crate::config::ScheduleSettings;
use crate::models::DateBounds;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::time::Duration;

/// When a full poll may start
///
/// The loop wakes every `step` and polls only during the first
/// `window_secs` seconds of a minute divisible by `modulus_minutes`. At
/// most one cycle runs per aligned window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPolicy {
    pub modulus_minutes: u32,
    pub window_secs: u32,
    pub step: Duration,
}

impl Default for TickPolicy {
    fn default() -> Self {
        Self::from(&ScheduleSettings::default())
    }
}

impl From<&ScheduleSettings> for TickPolicy {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            modulus_minutes: settings.tick_modulus_minutes.max(1),
            window_secs: settings.tick_window_secs,
            step: Duration::from_millis(settings.step_interval_ms),
        }
    }
}

impl TickPolicy {
    /// Whether `now` falls inside an aligned window
    pub fn is_aligned(&self, now: NaiveDateTime) -> bool {
        now.minute() % self.modulus_minutes == 0 && now.second() < self.window_secs
    }

    /// Identifier of the aligned window containing `now`, if any
    ///
    /// Two instants in the same window share a key, so the loop can tell a
    /// window it already polled from a fresh one.
    pub fn window_key(&self, now: NaiveDateTime) -> Option<i64> {
        self.is_aligned(now)
            .then(|| now.and_utc().timestamp().div_euclid(60))
    }
}

/// What to do with one date of a sorted availability list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateVerdict {
    /// Not strictly after the minimum date; look at the next one
    BelowMinimum,
    /// Worth trying
    Qualifies,
    /// Beyond the maximum date; no later date can qualify
    AboveMaximum,
    /// Not earlier than the booked appointment; no later date can qualify
    NotEarlier,
}

impl DateVerdict {
    pub fn stops_scan(&self) -> bool {
        matches!(self, Self::AboveMaximum | Self::NotEarlier)
    }
}

/// Judge one date against the account's bounds and current appointment
pub fn evaluate_date(
    date: NaiveDate,
    bounds: DateBounds,
    current: Option<NaiveDate>,
) -> DateVerdict {
    if date <= bounds.min {
        DateVerdict::BelowMinimum
    } else if bounds.exceeds_max(date) {
        DateVerdict::AboveMaximum
    } else if current.is_some_and(|current| date >= current) {
        DateVerdict::NotEarlier
    } else {
        DateVerdict::Qualifies
    }
}

/// Dates of an ascending list worth attempting, in order
pub fn qualifying_dates(
    dates: &[NaiveDate],
    bounds: DateBounds,
    current: Option<NaiveDate>,
) -> Vec<NaiveDate> {
    let mut qualifying = Vec::new();
    for &date in dates {
        match evaluate_date(date, bounds, current) {
            DateVerdict::BelowMinimum => continue,
            DateVerdict::Qualifies => qualifying.push(date),
            DateVerdict::AboveMaximum | DateVerdict::NotEarlier => break,
        }
    }
    qualifying
}
