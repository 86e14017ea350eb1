//! Resource id resolution
//!
//! Determines the schedule id and facility ids an account books against.
//! A configured id is used as-is. A missing id is derived from the portal's
//! authenticated pages when exactly one candidate fits, asked of an optional
//! [`Chooser`] when several do, and reported as an error otherwise. Every
//! resolved id is persisted to the account file immediately.

use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::models::ResourceKind;
use crate::parser::{self, Application, Choice, PRIMARY_FACILITY_SELECT, SECONDARY_FACILITY_SELECT};
use crate::portal::{paths, RequestKind};
use crate::session::SessionManager;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that stop resolution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The portal offered nothing to choose from
    #[error("No {kind} candidates offered by the portal")]
    NoCandidates { kind: ResourceKind },

    /// Several candidates remain and nothing disambiguates them
    #[error("Several {kind} candidates and no matching key: {}", describe(.candidates))]
    Ambiguous {
        kind: ResourceKind,
        candidates: Vec<Choice>,
    },

    /// The operator's answer did not name an offered candidate
    #[error("Invalid {kind} selection: {answer}")]
    InvalidSelection { kind: ResourceKind, answer: String },
}

fn describe(candidates: &[Choice]) -> String {
    candidates
        .iter()
        .map(|c| format!("{} ({})", c.id, c.label))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Asks an operator to pick among several candidates
#[async_trait]
pub trait Chooser: Send + Sync {
    /// Return the chosen id, or `None` to give up
    async fn choose(&self, kind: ResourceKind, candidates: &[Choice]) -> Option<String>;
}

/// Pick a candidate without asking anyone
///
/// Returns `Ok(None)` when several candidates remain. A key selects the
/// single candidate whose id equals it or whose label contains it,
/// ignoring case.
pub fn pick_candidate(
    kind: ResourceKind,
    candidates: &[Choice],
    key: Option<&str>,
) -> std::result::Result<Option<Choice>, ResolveError> {
    match candidates {
        [] => Err(ResolveError::NoCandidates { kind }),
        [only] => Ok(Some(only.clone())),
        _ => {
            let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
                return Ok(None);
            };
            let key = key.to_lowercase();
            let matching: Vec<&Choice> = candidates
                .iter()
                .filter(|c| c.id == key || c.label.to_lowercase().contains(&key))
                .collect();

            match matching.as_slice() {
                [single] => Ok(Some((*single).clone())),
                _ => Ok(None),
            }
        }
    }
}

/// Load the applications listed on the account dashboard
pub async fn fetch_applications(session: &mut SessionManager) -> Result<Vec<Application>> {
    let html = fetch_dashboard(session).await?;
    Ok(parser::parse_applications(&html))
}

/// Load the raw applications dashboard
pub async fn fetch_dashboard(session: &mut SessionManager) -> Result<String> {
    session
        .authorized(|client, context| async move {
            let page = client
                .get_page(
                    &paths::dashboard(),
                    &[],
                    RequestKind::Document,
                    &paths::dashboard(),
                    context.credentials(),
                )
                .await?;
            Ok::<_, Error>(page.body)
        })
        .await
}

/// Load one facility option list from the appointment page
pub async fn fetch_facilities(
    session: &mut SessionManager,
    schedule_id: &str,
    select_id: &str,
) -> Result<Vec<Choice>> {
    session
        .authorized(|client, context| async move {
            let page = client
                .get_page(
                    &paths::appointment(schedule_id),
                    &[],
                    RequestKind::Navigation,
                    &paths::continue_actions(schedule_id),
                    context.credentials(),
                )
                .await?;
            Ok::<_, Error>(parser::parse_facility_options(&page.body, select_id)?)
        })
        .await
}

/// Resolves and persists an account's resource ids
#[derive(Clone, Default)]
pub struct Resolver {
    chooser: Option<Arc<dyn Chooser>>,
}

impl Resolver {
    /// Resolver that never prompts
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that asks `chooser` when several candidates remain
    pub fn with_chooser(chooser: Arc<dyn Chooser>) -> Self {
        Self {
            chooser: Some(chooser),
        }
    }

    /// Resolve the application schedule id
    pub async fn resolve_schedule(
        &self,
        session: &mut SessionManager,
        account: &mut AccountConfig,
    ) -> Result<String> {
        let kind = ResourceKind::Schedule;
        if let Some(id) = account.resource_id(kind) {
            return Ok(id.to_string());
        }

        let candidates: Vec<Choice> = fetch_applications(session)
            .await?
            .iter()
            .map(Choice::from)
            .collect();

        self.settle(kind, &candidates, account).await
    }

    /// Resolve the primary facility id
    pub async fn resolve_primary(
        &self,
        session: &mut SessionManager,
        account: &mut AccountConfig,
        schedule_id: &str,
    ) -> Result<String> {
        self.resolve_facility(ResourceKind::Primary, PRIMARY_FACILITY_SELECT, session, account, schedule_id)
            .await
    }

    /// Resolve the secondary facility id
    pub async fn resolve_secondary(
        &self,
        session: &mut SessionManager,
        account: &mut AccountConfig,
        schedule_id: &str,
    ) -> Result<String> {
        self.resolve_facility(
            ResourceKind::Secondary,
            SECONDARY_FACILITY_SELECT,
            session,
            account,
            schedule_id,
        )
        .await
    }

    async fn resolve_facility(
        &self,
        kind: ResourceKind,
        select_id: &str,
        session: &mut SessionManager,
        account: &mut AccountConfig,
        schedule_id: &str,
    ) -> Result<String> {
        if let Some(id) = account.resource_id(kind) {
            return Ok(id.to_string());
        }

        let candidates = fetch_facilities(session, schedule_id, select_id).await?;
        self.settle(kind, &candidates, account).await
    }

    /// Pick among fetched candidates and persist the result
    async fn settle(
        &self,
        kind: ResourceKind,
        candidates: &[Choice],
        account: &mut AccountConfig,
    ) -> Result<String> {
        let chosen = match pick_candidate(kind, candidates, account.resource_key(kind))? {
            Some(choice) => choice,
            None => self.ask(kind, candidates).await?,
        };

        info!(
            account = %account.account_id(),
            kind = %kind,
            id = %chosen.id,
            label = %chosen.label,
            "Resolved id"
        );
        account.set_resource_id(kind, chosen.id.clone())?;
        Ok(chosen.id)
    }

    async fn ask(&self, kind: ResourceKind, candidates: &[Choice]) -> Result<Choice> {
        let Some(chooser) = &self.chooser else {
            return Err(ResolveError::Ambiguous {
                kind,
                candidates: candidates.to_vec(),
            }
            .into());
        };

        let answer = chooser.choose(kind, candidates).await.ok_or_else(|| {
            Error::from(ResolveError::Ambiguous {
                kind,
                candidates: candidates.to_vec(),
            })
        })?;

        candidates
            .iter()
            .find(|c| c.id == answer.trim())
            .cloned()
            .ok_or_else(|| {
                warn!(kind = %kind, answer = %answer, "Selection does not match any candidate");
                ResolveError::InvalidSelection { kind, answer }.into()
            })
    }
}
