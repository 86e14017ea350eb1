//! Core data structures shared across the engine

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire format for dates on the portal JSON endpoints and booking form
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Wire format for times on the portal JSON endpoints and booking form
pub const TIME_FORMAT: &str = "%H:%M";

/// Human-readable appointment format used in logs and notifications
pub const DATE_TIME_FORMAT: &str = "%H:%M %Y-%m-%d";

/// Which facility list a resource id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Application/schedule the booking is made against
    Schedule,
    /// Main facility (consulate)
    Primary,
    /// Dependent facility (application service center)
    Secondary,
}

impl ResourceKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acceptable booking window for an account
///
/// `max` is open-ended when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub min: NaiveDate,
    pub max: Option<NaiveDate>,
}

impl DateBounds {
    pub fn new(min: NaiveDate, max: Option<NaiveDate>) -> Self {
        Self { min, max }
    }

    /// Inclusive containment, used for pruning cached secondary dates
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.min && self.max.map_or(true, |max| date <= max)
    }

    /// Whether `date` lies beyond the upper bound
    pub fn exceeds_max(&self, date: NaiveDate) -> bool {
        self.max.is_some_and(|max| date > max)
    }
}

/// A secondary facility slot coupled to a primary candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondarySlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl fmt::Display for SecondarySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.time.format(TIME_FORMAT),
            self.date.format(DATE_FORMAT)
        )
    }
}

/// A slot considered for booking
///
/// Built once per attempt and dropped after the attempt whatever the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub secondary: Option<SecondarySlot>,
}

impl CandidateSlot {
    pub fn new(date: NaiveDate, time: NaiveTime, secondary: Option<SecondarySlot>) -> Self {
        Self {
            date,
            time,
            secondary,
        }
    }
}

impl fmt::Display for CandidateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.time.format(TIME_FORMAT),
            self.date.format(DATE_FORMAT)
        )?;
        if let Some(secondary) = &self.secondary {
            write!(f, " (secondary {secondary})")?;
        }
        Ok(())
    }
}

/// The account's currently booked appointment as shown on its dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppointmentSnapshot {
    pub scheduled_at: Option<NaiveDateTime>,
}

impl AppointmentSnapshot {
    pub fn new(scheduled_at: Option<NaiveDateTime>) -> Self {
        Self { scheduled_at }
    }

    /// Date part of the booked appointment, if any
    pub fn date(&self) -> Option<NaiveDate> {
        self.scheduled_at.map(|dt| dt.date())
    }

    /// Format for display
    pub fn display(&self) -> String {
        self.scheduled_at
            .map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
            .unwrap_or_else(|| "No date".to_string())
    }
}
