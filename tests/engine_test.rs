//! Account engine cycles against a simulated portal

mod common;

use common::*;
use slotwatch::booking::Transactor;
use slotwatch::error::Error;
use slotwatch::notifications::NotificationKind;
use slotwatch::resolver::Resolver;
use slotwatch::scheduler::{AccountEngine, CycleOutcome, EngineState};
use slotwatch::utils::error::ParseError;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(
    server: &MockServer,
    account: slotwatch::config::AccountConfig,
    notifier: Arc<RecordingNotifier>,
) -> AccountEngine {
    let (events, _) = broadcast::channel(100);
    AccountEngine::new(
        account,
        &settings_for(server),
        Resolver::new(),
        notifier,
        events,
    )
    .unwrap()
}

async fn mount_booking(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path(portal_path(&format!("/schedule/{SCHEDULE_ID}/appointment"))))
        .and(body_string_contains("authenticity_token=form-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Successfully Scheduled</body></html>"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

// An earlier date is booked and the change is confirmed
#[tokio::test]
async fn test_books_earlier_date() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(
        &server,
        Some("20 January, 2025, 09:00"),
        Some("10 January, 2025, 08:15"),
    )
    .await;
    mount_days(&server, PRIMARY_ID, &["2025-02-05", "2025-01-10", "2025-01-25"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-10", &["09:00", "08:15"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-25", &["08:00"], 0).await;
    mount_booking(&server, 1).await;

    let mut engine = engine(&server, bound_account(), Arc::default());
    engine.initialize().await.unwrap();
    assert_eq!(engine.snapshot().unwrap().date(), Some(date("2025-01-20")));

    let outcome = engine.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Booked {
            candidate, after, ..
        } => {
            assert_eq!(candidate.date, date("2025-01-10"));
            assert_eq!(candidate.time.to_string(), "08:15:00");
            assert!(candidate.secondary.is_none());
            assert_eq!(after.date(), Some(date("2025-01-10")));
        }
        other => panic!("expected a booking, got {other:?}"),
    }
    assert_eq!(engine.snapshot().unwrap().date(), Some(date("2025-01-10")));
}

// Nothing before the booked date, nothing is fetched or submitted
#[tokio::test]
async fn test_no_earlier_date_books_nothing() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(&server, Some("20 January, 2025, 09:00"), None).await;
    mount_days(&server, PRIMARY_ID, &["2025-01-25", "2025-02-05"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-25", &["08:00"], 0).await;
    mount_booking(&server, 0).await;

    let mut engine = engine(&server, bound_account(), Arc::default());
    let outcome = engine.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::NothingQualified);
    assert!(engine.is_initialized());
}

#[tokio::test]
async fn test_no_dates_offered() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(&server, Some("20 January, 2025, 09:00"), None).await;
    mount_days(&server, PRIMARY_ID, &[], 1).await;

    let mut engine = engine(&server, bound_account(), Arc::default());
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::NoDates);
}

// A submission the portal ignored is not a success; later times are tried
#[tokio::test]
async fn test_unchanged_booking_tries_next_time() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(
        &server,
        Some("20 January, 2025, 09:00"),
        Some("20 January, 2025, 09:00"),
    )
    .await;
    mount_days(&server, PRIMARY_ID, &["2025-01-10"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-10", &["08:15", "09:00"], 1).await;
    mount_booking(&server, 2).await;

    let mut engine = engine(&server, bound_account(), Arc::default());
    let outcome = engine.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Exhausted { attempts: 2 });
    assert_eq!(engine.snapshot().unwrap().date(), Some(date("2025-01-20")));
}

// A rejected poll re-logs in once; a second rejection ends the tick
#[tokio::test]
async fn test_unauthorized_poll_relogs_once() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(&server, Some("20 January, 2025, 09:00"), None).await;
    Mock::given(method("GET"))
        .and(path(days_path(PRIMARY_ID)))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let mut engine = engine(&server, bound_account(), Arc::default());
    engine.initialize().await.unwrap();

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, Error::AuthorizationExpired));
    assert!(!err.is_fatal());
    assert_eq!(engine.session().login_count(), 2);
}

#[tokio::test]
async fn test_unauthorized_poll_recovers_after_relogin() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(&server, Some("20 January, 2025, 09:00"), None).await;
    Mock::given(method("GET"))
        .and(path(days_path(PRIMARY_ID)))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_days(&server, PRIMARY_ID, &[], 1).await;

    let mut engine = engine(&server, bound_account(), Arc::default());
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::NoDates);
    assert_eq!(engine.session().login_count(), 2);
}

// The secondary slot comes from the cache filled at start-up
#[tokio::test]
async fn test_books_with_cached_secondary_slot() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(
        &server,
        Some("20 January, 2025, 09:00"),
        Some("10 January, 2025, 08:15"),
    )
    .await;
    mount_days(&server, PRIMARY_ID, &["2025-01-10"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-10", &["08:15"], 1).await;
    // Start-up refresh and the refresh after the pass
    mount_days(&server, SECONDARY_ID, &["2025-01-05"], 2).await;
    mount_times(&server, SECONDARY_ID, "2025-01-05", &["09:30"], 2).await;

    Mock::given(method("POST"))
        .and(path(portal_path(&format!("/schedule/{SCHEDULE_ID}/appointment"))))
        .and(body_string_contains("asc_appointment"))
        .and(body_string_contains("2025-01-05"))
        .and(body_string_contains("09%3A30"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut account = bound_account();
    account.need_secondary = true;
    account.secondary_facility_id = Some(SECONDARY_ID.to_string());

    let mut engine = engine(&server, account, Arc::default());
    let outcome = engine.run_cycle().await.unwrap();

    match outcome {
        CycleOutcome::Booked { candidate, .. } => {
            let secondary = candidate.secondary.unwrap();
            assert_eq!(secondary.date, date("2025-01-05"));
        }
        other => panic!("expected a booking, got {other:?}"),
    }
}

// A candidate without a secondary slot in the lead window is never booked
#[tokio::test]
async fn test_candidate_without_secondary_is_skipped() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(&server, Some("20 January, 2025, 09:00"), None).await;
    mount_days(&server, PRIMARY_ID, &["2025-01-10"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-10", &["08:15"], 1).await;
    // Only a secondary date after the primary date is offered
    Mock::given(method("GET"))
        .and(path(days_path(SECONDARY_ID)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "date": "2025-01-12" }])),
        )
        .mount(&server)
        .await;
    mount_times(&server, SECONDARY_ID, "2025-01-12", &["09:30"], 2).await;
    mount_booking(&server, 0).await;

    let mut account = bound_account();
    account.need_secondary = true;
    account.secondary_facility_id = Some(SECONDARY_ID.to_string());

    let mut engine = engine(&server, account, Arc::default());
    assert_eq!(
        engine.run_cycle().await.unwrap(),
        CycleOutcome::Exhausted { attempts: 0 }
    );
}

// A failed re-read after submitting must not leave the old appointment in
// place; the next cycle compares against what the dashboard now shows
#[tokio::test]
async fn test_failed_reread_after_booking_reloads_appointment() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;

    Mock::given(method("GET"))
        .and(path(portal_path("")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(dashboard(Some("20 January, 2025, 09:00"))),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(portal_path("")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(portal_path("")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(dashboard(Some("10 January, 2025, 08:15"))),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(days_path(PRIMARY_ID)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "date": "2025-01-10" }])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_days(&server, PRIMARY_ID, &["2025-01-15"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-10", &["08:15"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-15", &["08:15"], 0).await;
    mount_booking(&server, 1).await;

    let mut engine = engine(&server, bound_account(), Arc::default());
    engine.initialize().await.unwrap();

    let err = engine.run_cycle().await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(!engine.is_initialized());
    assert!(engine.snapshot().is_none());

    assert_eq!(
        engine.run_cycle().await.unwrap(),
        CycleOutcome::NothingQualified
    );
    assert_eq!(engine.snapshot().unwrap().date(), Some(date("2025-01-10")));
}

#[tokio::test]
async fn test_current_date_at_floor_is_fatal() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(&server, Some("10 January, 2025, 09:00"), None).await;

    let mut account = bound_account();
    account.min_date = Some(date("2025-01-15"));

    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine(&server, account, Arc::clone(&notifier));
    let (_stop, stop_rx) = watch::channel(false);

    assert_eq!(engine.run(stop_rx).await, EngineState::Fatal);

    let notifications = notifier.taken();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Stopped);
    assert!(notifications[0].message.contains("2025-01-10"));
}

#[tokio::test]
async fn test_run_books_and_notifies() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(
        &server,
        Some("20 January, 2025, 09:00"),
        Some("10 January, 2025, 08:15"),
    )
    .await;
    mount_days(&server, PRIMARY_ID, &["2025-01-10"], 1).await;
    mount_times(&server, PRIMARY_ID, "2025-01-10", &["08:15"], 1).await;
    mount_booking(&server, 1).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine(&server, bound_account(), Arc::clone(&notifier));
    let (_stop, stop_rx) = watch::channel(false);

    let state = tokio::time::timeout(std::time::Duration::from_secs(10), engine.run(stop_rx))
        .await
        .unwrap();
    assert_eq!(state, EngineState::Success);

    let notifications = notifier.taken();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Booked);
    assert!(notifications[0].message.contains("08:15 2025-01-10"));
}

#[tokio::test]
async fn test_stop_between_ticks() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_appointment_page(&server, appointment_page(&[], &[])).await;
    mount_dashboards(&server, Some("20 January, 2025, 09:00"), None).await;
    Mock::given(method("GET"))
        .and(path(days_path(PRIMARY_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine(&server, bound_account(), Arc::clone(&notifier));
    let (stop, stop_rx) = watch::channel(false);

    let handle = tokio::spawn(engine.run(stop_rx));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    stop.send_replace(true);

    assert_eq!(handle.await.unwrap(), EngineState::Stopped);
    assert!(notifier.taken().is_empty());
}

#[tokio::test]
async fn test_invalid_lead_window_is_rejected() {
    let server = MockServer::start().await;
    let mut settings = settings_for(&server);
    settings.schedule.lead_window_days = -1;

    let (events, _) = broadcast::channel(100);
    let result = AccountEngine::new(
        bound_account(),
        &settings,
        Resolver::new(),
        Arc::new(RecordingNotifier::default()),
        events,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_snapshot_is_read_for_the_bound_schedule() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_dashboards(&server, Some("20 January, 2025, 09:00"), None).await;

    let mut session = session_for(&server);

    let transactor = Transactor::new(SCHEDULE_ID, PRIMARY_ID, None);
    let snapshot = transactor.read_snapshot(&mut session).await.unwrap();
    assert_eq!(snapshot.date(), Some(date("2025-01-20")));

    let unknown = Transactor::new("99999999", PRIMARY_ID, None);
    let err = unknown.read_snapshot(&mut session).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Parse(ParseError::ApplicationNotFound(ref id)) if id == "99999999"
    ));
}
