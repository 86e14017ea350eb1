//! Account scheduling
//!
//! Each account runs its own [`AccountEngine`] loop:
//!
//! ```text
//! IDLE → AUTHENTICATING → POLLING → EVALUATING → BOOKING → (SUCCESS | RETRY) → POLLING …
//!                                                             terminal: STOPPED, FATAL
//! ```
//!
//! The loop sleeps in short steps and runs a full cycle only inside an
//! aligned window ([`TickPolicy`]). Dates are filtered by
//! [`qualifying_dates`]. Errors abandon the cycle and wait for the next
//! window unless [`Error::is_fatal`](crate::error::Error::is_fatal) says
//! otherwise.
//!
//! [`Supervisor`] runs many accounts as independent tasks and exposes
//! `start`, `stop` and `list`.

pub mod engine;
pub mod policy;
pub mod state;
pub mod supervisor;

pub use engine::AccountEngine;
pub use policy::{evaluate_date, qualifying_dates, DateVerdict, TickPolicy};
pub use state::{CycleOutcome, EngineEvent, EngineState};
pub use supervisor::{StopHandle, Supervisor};
