//! Account loop states, events and cycle outcomes

use crate::models::{AppointmentSnapshot, CandidateSlot};
use chrono::{DateTime, Utc};
use std::fmt;

/// Where an account loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    Authenticating,
    Polling,
    Evaluating,
    Booking,
    /// A booking moved the appointment; terminal
    Success,
    /// The last booking left the appointment unchanged or the last cycle failed
    Retry,
    /// Stopped on request; terminal
    Stopped,
    /// Stopped on a fatal condition; terminal
    Fatal,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Polling => "polling",
            Self::Evaluating => "evaluating",
            Self::Booking => "booking",
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Stopped => "stopped",
            Self::Fatal => "fatal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Stopped | Self::Fatal)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one polling cycle that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The portal offered no dates at all
    NoDates,
    /// Dates were offered but none beat the current appointment within bounds
    NothingQualified,
    /// Qualifying dates were tried and the appointment did not move
    Exhausted { attempts: usize },
    /// A booking moved the appointment
    Booked {
        candidate: CandidateSlot,
        before: AppointmentSnapshot,
        after: AppointmentSnapshot,
    },
}

impl CycleOutcome {
    pub fn is_booked(&self) -> bool {
        matches!(self, Self::Booked { .. })
    }
}

/// Material events of all account loops, broadcast to any subscriber
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged {
        account: String,
        from: EngineState,
        to: EngineState,
        at: DateTime<Utc>,
    },

    DatesPolled {
        account: String,
        offered: usize,
        qualifying: usize,
    },

    BookingAttempted {
        account: String,
        candidate: CandidateSlot,
        changed: bool,
    },

    CycleFailed {
        account: String,
        error: String,
        fatal: bool,
    },

    Finished {
        account: String,
        state: EngineState,
    },
}

impl EngineEvent {
    pub fn account(&self) -> &str {
        match self {
            Self::StateChanged { account, .. }
            | Self::DatesPolled { account, .. }
            | Self::BookingAttempted { account, .. }
            | Self::CycleFailed { account, .. }
            | Self::Finished { account, .. } => account,
        }
    }
}
