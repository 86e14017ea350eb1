//! CSS selectors and patterns for the portal's HTML pages

use lazy_static::lazy_static;
use regex::Regex;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

/// Id of the primary facility `<select>` on the appointment page
pub const PRIMARY_FACILITY_SELECT: &str = "appointments_consulate_appointment_facility_id";

/// Id of the secondary facility `<select>` on the appointment page
pub const SECONDARY_FACILITY_SELECT: &str = "appointments_asc_appointment_facility_id";

/// Text the portal shows after a booking it accepted
pub const BOOKED_BANNER: &str = "Successfully Scheduled";

lazy_static! {
    pub static ref CSRF_META: Selector = parse_selector!("meta[name=\"csrf-token\"]");

    // Dashboard
    pub static ref APPLICATION: Selector = parse_selector!("div.application");
    pub static ref APPLICATION_LINK: Selector = parse_selector!("a");
    pub static ref APPLICATION_CELL: Selector = parse_selector!("td");
    pub static ref CONSULAR_APPOINTMENT: Selector = parse_selector!("p.consular-appt");

    // Appointment page
    pub static ref OPTION: Selector = parse_selector!("option");

    pub static ref NUMBER: Regex = Regex::new(r"\d+").expect("Invalid regex pattern");

    /// e.g. "12 March, 2025, 08:15"
    pub static ref APPOINTMENT_DATE_TIME: Regex =
        Regex::new(r"\d{1,2} \w+?, \d{4}, \d{1,2}:\d{1,2}").expect("Invalid regex pattern");
}

/// Format matching [`struct@APPOINTMENT_DATE_TIME`]
pub const APPOINTMENT_DATE_TIME_FORMAT: &str = "%d %B, %Y, %H:%M";

/// Selector for a `<select>` by element id
pub fn select_by_id(id: &str) -> Option<Selector> {
    Selector::parse(&format!("select#{id}")).ok()
}
