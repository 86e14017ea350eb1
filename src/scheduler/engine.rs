//! One account's polling loop
//!
//! The engine owns everything that belongs to a single account: its
//! configuration, its session and the ids it resolved. Nothing is shared
//! with other accounts except the event channel and the notifier.

use super::policy::{qualifying_dates, TickPolicy};
use super::state::{CycleOutcome, EngineEvent, EngineState};
use crate::booking::{BookingOutcome, Transactor};
use crate::config::{AccountConfig, Settings};
use crate::coupler::Coupler;
use crate::error::{Error, Result};
use crate::models::{AppointmentSnapshot, CandidateSlot};
use crate::notifications::{Notification, Notifier};
use crate::poller::Poller;
use crate::portal::PortalClient;
use crate::resolver::Resolver;
use crate::session::SessionManager;
use chrono::{Local, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Ids and collaborators available once an account is initialized
struct BoundAccount {
    primary_facility_id: String,
    poller: Poller,
    transactor: Transactor,
    coupler: Option<Coupler>,
    snapshot: AppointmentSnapshot,
}

/// Tracks the current state and publishes events
struct Reporter {
    account: String,
    state: EngineState,
    events: broadcast::Sender<EngineEvent>,
}

impl Reporter {
    fn transition(&mut self, to: EngineState) {
        if self.state == to {
            return;
        }
        let from = std::mem::replace(&mut self.state, to);
        debug!(%from, %to, "State changed");
        self.emit(EngineEvent::StateChanged {
            account: self.account.clone(),
            from,
            to,
            at: Utc::now(),
        });
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Polling and booking loop of one account
pub struct AccountEngine {
    account: AccountConfig,
    policy: TickPolicy,
    lead_days: i64,
    session: SessionManager,
    resolver: Resolver,
    notifier: Arc<dyn Notifier>,
    reporter: Reporter,
    bound: Option<BoundAccount>,
}

impl AccountEngine {
    /// Build an engine for an account with its own portal session
    pub fn new(
        account: AccountConfig,
        settings: &Settings,
        resolver: Resolver,
        notifier: Arc<dyn Notifier>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Result<Self> {
        account.validate()?;
        settings
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;

        let client = PortalClient::for_country(settings, &account.country)?;
        let session = SessionManager::new(client, account.email.clone(), account.password.clone());

        Ok(Self {
            reporter: Reporter {
                account: account.account_id(),
                state: EngineState::Idle,
                events,
            },
            account,
            policy: TickPolicy::from(&settings.schedule),
            lead_days: settings.schedule.lead_window_days,
            session,
            resolver,
            notifier,
            bound: None,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.reporter.account
    }

    pub fn account(&self) -> &AccountConfig {
        &self.account
    }

    pub fn state(&self) -> EngineState {
        self.reporter.state
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Currently booked appointment, once initialized
    pub fn snapshot(&self) -> Option<AppointmentSnapshot> {
        self.bound.as_ref().map(|b| b.snapshot)
    }

    pub fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    /// Log in, resolve ids and read the current appointment
    ///
    /// Fails with [`Error::BelowMinimumDate`] when the booked appointment
    /// is already at or before the account's minimum date.
    pub async fn initialize(&mut self) -> Result<()> {
        self.reporter.transition(EngineState::Authenticating);
        self.session.ensure_authenticated().await?;

        let schedule_id = self
            .resolver
            .resolve_schedule(&mut self.session, &mut self.account)
            .await?;
        self.session.bind_schedule(&schedule_id).await?;

        let primary = self
            .resolver
            .resolve_primary(&mut self.session, &mut self.account, &schedule_id)
            .await?;
        let secondary = if self.account.need_secondary {
            Some(
                self.resolver
                    .resolve_secondary(&mut self.session, &mut self.account, &schedule_id)
                    .await?,
            )
        } else {
            None
        };

        let poller = Poller::new(schedule_id.as_str());
        let transactor = Transactor::new(schedule_id.as_str(), primary.as_str(), secondary.clone());
        let snapshot = transactor.read_snapshot(&mut self.session).await?;
        let bounds = self.account.bounds();

        info!(
            schedule_id = %schedule_id,
            facility_id = %primary,
            secondary_facility_id = ?secondary,
            current = %snapshot.display(),
            min_date = %bounds.min,
            max_date = ?bounds.max,
            "Account initialized"
        );

        if let Some(current) = snapshot.date() {
            if current <= bounds.min {
                return Err(Error::BelowMinimumDate {
                    current,
                    min: bounds.min,
                });
            }
        }

        let coupler = match secondary {
            Some(secondary) => {
                let mut coupler = Coupler::new(
                    primary.as_str(),
                    secondary,
                    self.lead_days,
                    self.account.secondary_cache_path(),
                );
                coupler.refresh(&mut self.session, &poller, bounds).await;
                Some(coupler)
            }
            None => None,
        };

        self.bound = Some(BoundAccount {
            primary_facility_id: primary,
            poller,
            transactor,
            coupler,
            snapshot,
        });
        self.reporter.transition(EngineState::Idle);
        Ok(())
    }

    /// Run one polling cycle
    ///
    /// Dates are scanned earliest first and times earliest first. The
    /// cycle ends at the first booking that moves the appointment. The
    /// secondary cache is refreshed once after a pass that tried at least
    /// one qualifying date.
    ///
    /// A failed booking submission leaves the account uninitialized, so the
    /// next cycle reads the current appointment again before evaluating.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        if self.bound.is_none() {
            self.initialize().await?;
        }

        let bounds = self.account.bounds();
        let Self {
            session,
            reporter,
            bound: slot,
            ..
        } = self;
        let bound = slot
            .as_mut()
            .ok_or_else(|| Error::other("account is not initialized"))?;

        reporter.transition(EngineState::Polling);
        let dates = bound
            .poller
            .available_dates(session, &bound.primary_facility_id, None)
            .await?;
        let Some(earliest) = dates.first().copied() else {
            info!("No available dates");
            return Ok(CycleOutcome::NoDates);
        };

        reporter.transition(EngineState::Evaluating);
        let qualifying = qualifying_dates(&dates, bounds, bound.snapshot.date());
        info!(
            offered = dates.len(),
            qualifying = qualifying.len(),
            %earliest,
            current = %bound.snapshot.display(),
            "Dates polled"
        );
        reporter.emit(EngineEvent::DatesPolled {
            account: reporter.account.clone(),
            offered: dates.len(),
            qualifying: qualifying.len(),
        });

        if qualifying.is_empty() {
            return Ok(CycleOutcome::NothingQualified);
        }

        let mut attempts = 0;
        let mut booked = None;
        let mut failed_booking = None;

        'dates: for date in qualifying {
            let times = bound
                .poller
                .available_times(session, &bound.primary_facility_id, date, None)
                .await?;
            if times.is_empty() {
                debug!(%date, "No times left on date");
                continue;
            }

            for time in times {
                let secondary = match &bound.coupler {
                    Some(coupler) => {
                        match coupler.couple(session, &bound.poller, date, time).await? {
                            Some(found) => Some(found),
                            None => {
                                info!(%date, %time, "No secondary slot in lead window, skipping");
                                continue;
                            }
                        }
                    }
                    None => None,
                };

                let candidate = CandidateSlot::new(date, time, secondary);
                reporter.transition(EngineState::Booking);
                attempts += 1;

                let before = bound.snapshot;
                let after = match bound.transactor.book(session, &candidate).await {
                    Ok(after) => after,
                    Err(e) => {
                        failed_booking = Some(e);
                        break 'dates;
                    }
                };
                let outcome = BookingOutcome::compare(before, after);

                reporter.emit(EngineEvent::BookingAttempted {
                    account: reporter.account.clone(),
                    candidate,
                    changed: outcome.is_changed(),
                });

                if let BookingOutcome::Changed { before, after } = outcome {
                    bound.snapshot = after;
                    booked = Some(CycleOutcome::Booked {
                        candidate,
                        before,
                        after,
                    });
                    break 'dates;
                }

                info!(%candidate, current = %before.display(), "Appointment unchanged after booking");
                reporter.transition(EngineState::Retry);
            }
        }

        // The submission may have landed; the held snapshot is stale
        if let Some(e) = failed_booking {
            warn!(error = %e, "Booking outcome unknown, re-reading account on next tick");
            *slot = None;
            return Err(e);
        }

        if let Some(coupler) = bound.coupler.as_mut() {
            coupler.refresh(session, &bound.poller, bounds).await;
        }

        Ok(booked.unwrap_or(CycleOutcome::Exhausted { attempts }))
    }

    /// Drive the account until it books, fails fatally or is told to stop
    ///
    /// A stop request is honored while sleeping between ticks; a cycle in
    /// progress always finishes first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> EngineState {
        info!(account = %self.reporter.account, "Account loop started");

        let final_state = self.drive(&mut shutdown).await;

        self.reporter.transition(final_state);
        self.reporter.emit(EngineEvent::Finished {
            account: self.reporter.account.clone(),
            state: final_state,
        });
        info!(state = %final_state, "Account loop finished");
        final_state
    }

    async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>) -> EngineState {
        if *shutdown.borrow() {
            return EngineState::Stopped;
        }

        if let Err(e) = self.initialize().await {
            if let Some(state) = self.handle_failure(e).await {
                return state;
            }
        }

        let mut last_window = None;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.policy.step) => {}
                _ = shutdown.changed() => return EngineState::Stopped,
            }

            let Some(window) = self.policy.window_key(Local::now().naive_local()) else {
                continue;
            };
            if last_window == Some(window) {
                continue;
            }
            last_window = Some(window);

            match self.run_cycle().await {
                Ok(CycleOutcome::Booked {
                    candidate,
                    before,
                    after,
                }) => {
                    info!(%candidate, before = %before.display(), after = %after.display(), "Appointment rescheduled");
                    let message = format!(
                        "Rescheduled from {} to {}",
                        before.display(),
                        after.display()
                    );
                    self.notifier
                        .notify(Notification::booked(self.reporter.account.clone(), message))
                        .await;
                    return EngineState::Success;
                }
                Ok(outcome) => {
                    debug!(?outcome, "Cycle finished");
                    self.reporter.transition(EngineState::Idle);
                }
                Err(e) => {
                    if let Some(state) = self.handle_failure(e).await {
                        return state;
                    }
                }
            }
        }
    }

    /// Classify a failed cycle; `Some` means the loop must end
    async fn handle_failure(&mut self, e: Error) -> Option<EngineState> {
        let fatal = e.is_fatal();
        self.reporter.emit(EngineEvent::CycleFailed {
            account: self.reporter.account.clone(),
            error: e.to_string(),
            fatal,
        });

        if fatal {
            error!(category = %e.category(), error = %e, "Fatal error, stopping");
            self.notifier
                .notify(Notification::stopped(
                    self.reporter.account.clone(),
                    format!("Stopped: {e}"),
                ))
                .await;
            return Some(EngineState::Fatal);
        }

        warn!(
            category = %e.category(),
            recoverable = e.is_recoverable(),
            error = %e,
            "Cycle abandoned until next tick"
        );
        self.reporter.transition(EngineState::Retry);
        None
    }
}
