//! Common test utilities: a simulated portal on a wiremock server

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use slotwatch::config::{AccountConfig, Settings};
use slotwatch::notifications::{Notification, Notifier};
use slotwatch::portal::PortalClient;
use slotwatch::session::SessionManager;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SCHEDULE_ID: &str = "51234567";
pub const PRIMARY_ID: &str = "94";
pub const SECONDARY_ID: &str = "97";

const SIGN_IN_PAGE: &str =
    r#"<html><head><meta name="csrf-token" content="login-token"></head><body></body></html>"#;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Path of a portal endpoint on the mock server
pub fn portal_path(relative: &str) -> String {
    format!("/en-ca/niv{relative}")
}

/// Dashboard listing one application with the given appointment text
pub fn dashboard(appointment: Option<&str>) -> String {
    let appointment = appointment
        .map(|text| {
            format!(
                r#"<p class="consular-appt"><strong>Consular Appointment:</strong> {text} Toronto local time</p>"#
            )
        })
        .unwrap_or_default();

    format!(
        r#"<html><head><meta name="csrf-token" content="dash-token"></head><body>
        <div class="application attend_appointment card success">
          <table><tr><td>Jane Doe</td><td>AB123456</td><td>B1/B2</td><td>Toronto</td></tr></table>
          {appointment}
          <a class="button" href="/en-ca/niv/schedule/{SCHEDULE_ID}/continue_actions">Continue</a>
        </div>
        </body></html>"#
    )
}

/// Appointment page with the form token and facility selects
pub fn appointment_page(primary: &[(&str, &str)], secondary: &[(&str, &str)]) -> String {
    let options = |choices: &[(&str, &str)]| {
        choices
            .iter()
            .map(|(id, label)| format!(r#"<option value="{id}">{label}</option>"#))
            .collect::<String>()
    };

    format!(
        r#"<html><head><meta name="csrf-token" content="form-token"></head><body>
        <select id="appointments_consulate_appointment_facility_id"><option value=""></option>{}</select>
        <select id="appointments_asc_appointment_facility_id"><option value=""></option>{}</select>
        </body></html>"#,
        options(primary),
        options(secondary)
    )
}

/// Settings pointing at the mock server, with fast ticks
pub fn settings_for(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.portal.base_url = Some(format!("{}/en-ca/niv", server.uri()));
    settings.portal.requests_per_second = 100;
    settings.portal.request_timeout_secs = 5;
    settings.schedule.tick_modulus_minutes = 1;
    settings.schedule.tick_window_secs = 60;
    settings.schedule.step_interval_ms = 10;
    settings
}

pub fn session_for(server: &MockServer) -> SessionManager {
    let client = PortalClient::with_config(
        &format!("{}/en-ca/niv", server.uri()),
        100,
        Duration::from_secs(5),
        "test-agent",
    )
    .unwrap();
    SessionManager::new(client, "jane@example.com", "secret")
}

/// Account with every id configured and a floor of 2025-01-01
pub fn bound_account() -> AccountConfig {
    let mut account = AccountConfig::new("jane@example.com", "secret", "ca");
    account.min_date = Some(date("2025-01-01"));
    account.schedule_id = Some(SCHEDULE_ID.to_string());
    account.facility_id = Some(PRIMARY_ID.to_string());
    account
}

pub async fn mount_login(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path(portal_path("/users/sign_in")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "_yatri_session=anon; path=/")
                .set_body_string(SIGN_IN_PAGE),
        )
        .expect(expected)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(portal_path("/users/sign_in")))
        .and(header("x-csrf-token", "login-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "_yatri_session=authed; path=/; HttpOnly"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_appointment_page(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path(portal_path(&format!("/schedule/{SCHEDULE_ID}/appointment"))))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serve `first` on the first dashboard load and `then` afterwards
pub async fn mount_dashboards(server: &MockServer, first: Option<&str>, then: Option<&str>) {
    Mock::given(method("GET"))
        .and(path(portal_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_string(dashboard(first)))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(portal_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_string(dashboard(then)))
        .mount(server)
        .await;
}

pub fn days_path(facility_id: &str) -> String {
    portal_path(&format!(
        "/schedule/{SCHEDULE_ID}/appointment/days/{facility_id}.json"
    ))
}

pub fn times_path(facility_id: &str) -> String {
    portal_path(&format!(
        "/schedule/{SCHEDULE_ID}/appointment/times/{facility_id}.json"
    ))
}

pub async fn mount_days(server: &MockServer, facility_id: &str, dates: &[&str], expected: u64) {
    let body: Vec<_> = dates
        .iter()
        .map(|d| json!({ "date": d, "business_day": true }))
        .collect();

    Mock::given(method("GET"))
        .and(path(days_path(facility_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_times(
    server: &MockServer,
    facility_id: &str,
    on: &str,
    times: &[&str],
    expected: u64,
) {
    Mock::given(method("GET"))
        .and(path(times_path(facility_id)))
        .and(query_param("date", on))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "available_times": times, "business_times": [] })),
        )
        .expect(expected)
        .mount(server)
        .await;
}

/// Notifier that keeps everything it is given
#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn taken(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}
