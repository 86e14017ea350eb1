//! HTML parsing and data extraction for portal pages
//!
//! Everything the engine reads from HTML goes through here: the CSRF token,
//! the applications dashboard and the facility option lists on the
//! appointment page.

pub mod selectors;

pub use selectors::{BOOKED_BANNER, PRIMARY_FACILITY_SELECT, SECONDARY_FACILITY_SELECT};

use crate::models::{DATE_FORMAT, TIME_FORMAT};
use crate::utils::error::ParseError;
use crate::utils::normalize_whitespace;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

/// One application listed on the account dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Schedule id used in every appointment URL
    pub schedule_id: String,

    /// Applicant details from the first table cells
    pub description: String,

    /// Currently booked appointment, if any
    pub appointment: Option<NaiveDateTime>,
}

/// An `{id: label}` entry offered by the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl From<&Application> for Choice {
    fn from(app: &Application) -> Self {
        Self::new(app.schedule_id.clone(), app.description.clone())
    }
}

/// Extract the anti-forgery token from `<meta name="csrf-token">`
pub fn extract_csrf_token(html: &str) -> Result<String, ParseError> {
    let document = Html::parse_document(html);
    document
        .select(&selectors::CSRF_META)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(ParseError::CsrfTokenNotFound)
}

/// Parse every application block on the dashboard
///
/// Blocks without a schedule id are skipped. An empty result is not an
/// error here; callers decide what no applications means.
pub fn parse_applications(html: &str) -> Vec<Application> {
    let document = Html::parse_document(html);
    document
        .select(&selectors::APPLICATION)
        .filter_map(parse_application)
        .collect()
}

fn parse_application(block: ElementRef<'_>) -> Option<Application> {
    let link = block.select(&selectors::APPLICATION_LINK).next()?;
    let schedule_id = selectors::NUMBER.find(&link.html())?.as_str().to_string();

    let description = block
        .select(&selectors::APPLICATION_CELL)
        .take(4)
        .map(|cell| cell.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");

    let appointment = block
        .select(&selectors::CONSULAR_APPOINTMENT)
        .next()
        .and_then(|p| parse_appointment_datetime(&p.text().collect::<String>()));

    Some(Application {
        schedule_id,
        description: normalize_whitespace(&description),
        appointment,
    })
}

/// Find the application matching a schedule id
pub fn find_application(html: &str, schedule_id: &str) -> Result<Application, ParseError> {
    parse_applications(html)
        .into_iter()
        .find(|app| app.schedule_id == schedule_id)
        .ok_or_else(|| ParseError::ApplicationNotFound(schedule_id.to_string()))
}

/// Extract the appointment date and time from free dashboard text
pub fn parse_appointment_datetime(text: &str) -> Option<NaiveDateTime> {
    let found = selectors::APPOINTMENT_DATE_TIME.find(text)?;
    NaiveDateTime::parse_from_str(found.as_str(), selectors::APPOINTMENT_DATE_TIME_FORMAT).ok()
}

/// List the options of a facility `<select>`, in page order
///
/// Placeholder options with an empty value are skipped.
pub fn parse_facility_options(html: &str, select_id: &str) -> Result<Vec<Choice>, ParseError> {
    let document = Html::parse_document(html);
    let selector =
        selectors::select_by_id(select_id).ok_or_else(|| ParseError::SelectNotFound(select_id.to_string()))?;
    let select = document
        .select(&selector)
        .next()
        .ok_or_else(|| ParseError::SelectNotFound(select_id.to_string()))?;

    Ok(select
        .select(&selectors::OPTION)
        .filter_map(|option| {
            let id = option.value().attr("value")?.trim();
            if id.is_empty() {
                return None;
            }
            let label = normalize_whitespace(&option.text().collect::<String>());
            Some(Choice::new(id, label))
        })
        .collect())
}

/// Whether a booking response carries the portal's confirmation banner
pub fn has_booked_banner(html: &str) -> bool {
    html.contains(BOOKED_BANNER)
}

/// Parse a `YYYY-MM-DD` date from the portal
pub fn parse_date(value: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ParseError::InvalidDate(value.to_string()))
}

/// Parse an `HH:MM` time from the portal
pub fn parse_time(value: &str) -> Result<NaiveTime, ParseError> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map_err(|_| ParseError::InvalidTime(value.to_string()))
}
