//! Booking submission
//!
//! The portal can answer a booking with 200 and leave the appointment as it
//! was, so the response is never trusted on its own. After every
//! submission the dashboard is read again and the caller compares the
//! snapshots.

use crate::error::{Error, Result};
use crate::models::{AppointmentSnapshot, CandidateSlot, DATE_FORMAT, TIME_FORMAT};
use crate::parser;
use crate::portal::{paths, RequestKind};
use crate::resolver::fetch_dashboard;
use crate::session::SessionManager;
use tracing::{debug, info};

/// Result of comparing the appointment before and after a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingOutcome {
    /// The booked appointment moved
    Changed {
        before: AppointmentSnapshot,
        after: AppointmentSnapshot,
    },
    /// The submission was accepted or ignored without effect
    Unchanged,
}

impl BookingOutcome {
    /// Compare snapshots taken around a submission
    pub fn compare(before: AppointmentSnapshot, after: AppointmentSnapshot) -> Self {
        if after.scheduled_at.is_some() && after != before {
            Self::Changed { before, after }
        } else {
            Self::Unchanged
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Build the booking form body
///
/// Secondary fields are omitted entirely when the candidate has no
/// secondary slot.
pub fn booking_form(
    authenticity_token: &str,
    primary_facility_id: &str,
    secondary_facility_id: Option<&str>,
    candidate: &CandidateSlot,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("authenticity_token", authenticity_token.to_string()),
        ("confirmed_limit_message", "1".to_string()),
        ("use_consulate_appointment_capacity", "true".to_string()),
        (
            "appointments[consulate_appointment][facility_id]",
            primary_facility_id.to_string(),
        ),
        (
            "appointments[consulate_appointment][date]",
            candidate.date.format(DATE_FORMAT).to_string(),
        ),
        (
            "appointments[consulate_appointment][time]",
            candidate.time.format(TIME_FORMAT).to_string(),
        ),
    ];

    if let (Some(secondary), Some(facility_id)) = (&candidate.secondary, secondary_facility_id) {
        form.push((
            "appointments[asc_appointment][facility_id]",
            facility_id.to_string(),
        ));
        form.push((
            "appointments[asc_appointment][date]",
            secondary.date.format(DATE_FORMAT).to_string(),
        ));
        form.push((
            "appointments[asc_appointment][time]",
            secondary.time.format(TIME_FORMAT).to_string(),
        ));
    }

    form
}

/// Submits bookings for one schedule
#[derive(Debug, Clone)]
pub struct Transactor {
    schedule_id: String,
    primary_facility_id: String,
    secondary_facility_id: Option<String>,
}

impl Transactor {
    pub fn new(
        schedule_id: impl Into<String>,
        primary_facility_id: impl Into<String>,
        secondary_facility_id: Option<String>,
    ) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            primary_facility_id: primary_facility_id.into(),
            secondary_facility_id,
        }
    }

    /// Read the currently booked appointment from the dashboard
    pub async fn read_snapshot(&self, session: &mut SessionManager) -> Result<AppointmentSnapshot> {
        let html = fetch_dashboard(session).await?;
        let application = parser::find_application(&html, &self.schedule_id)?;

        Ok(AppointmentSnapshot::new(application.appointment))
    }

    /// Submit a booking and return the appointment as it stands afterwards
    pub async fn book(
        &self,
        session: &mut SessionManager,
        candidate: &CandidateSlot,
    ) -> Result<AppointmentSnapshot> {
        info!(schedule_id = %self.schedule_id, %candidate, "Submitting booking");

        let path = paths::appointment(&self.schedule_id);
        let path = path.as_str();
        let primary = self.primary_facility_id.as_str();
        let secondary = self.secondary_facility_id.as_deref();

        let accepted = session
            .authorized(|client, context| async move {
                let form = booking_form(&context.csrf_token, primary, secondary, candidate);
                let pairs: Vec<(&str, &str)> =
                    form.iter().map(|(k, v)| (*k, v.as_str())).collect();
                let page = client
                    .post_form(
                        path,
                        &pairs,
                        RequestKind::Form,
                        path,
                        context.credentials(),
                    )
                    .await?;
                Ok::<_, Error>(parser::has_booked_banner(&page.body))
            })
            .await?;

        debug!(banner = accepted, "Booking response received");
        self.read_snapshot(session).await
    }
}
