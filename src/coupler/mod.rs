//! Secondary facility coupling
//!
//! A booking that needs a secondary slot may only pair a primary candidate
//! with a secondary date inside the lead window: at most `lead_days` before
//! the primary date and strictly before it. The coupler first consults a
//! cached snapshot of secondary availability and only queries the portal
//! when the cache has nothing usable.

pub mod cache;

pub use cache::SecondaryCache;

use crate::error::Result;
use crate::models::{DateBounds, SecondarySlot};
use crate::poller::{Coupling, Poller};
use crate::session::SessionManager;
use chrono::{Duration, NaiveDate, NaiveTime};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Earliest secondary date allowed for a primary date
pub fn window_start(primary: NaiveDate, lead_days: i64) -> NaiveDate {
    primary - Duration::days(lead_days)
}

/// Whether `secondary` may be paired with `primary`
pub fn in_lead_window(secondary: NaiveDate, primary: NaiveDate, lead_days: i64) -> bool {
    secondary >= window_start(primary, lead_days) && secondary < primary
}

/// Pairs primary candidates with secondary slots
#[derive(Debug)]
pub struct Coupler {
    primary_facility_id: String,
    secondary_facility_id: String,
    lead_days: i64,
    cache: SecondaryCache,
    cache_path: Option<PathBuf>,
}

impl Coupler {
    /// Create a coupler, loading any cache snapshot left by a previous run
    pub fn new(
        primary_facility_id: impl Into<String>,
        secondary_facility_id: impl Into<String>,
        lead_days: i64,
        cache_path: Option<PathBuf>,
    ) -> Self {
        let cache = cache_path
            .as_deref()
            .map(SecondaryCache::load)
            .unwrap_or_default();

        Self {
            primary_facility_id: primary_facility_id.into(),
            secondary_facility_id: secondary_facility_id.into(),
            lead_days,
            cache,
            cache_path,
        }
    }

    /// Replace the cache contents
    pub fn with_cache(mut self, cache: SecondaryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &SecondaryCache {
        &self.cache
    }

    pub fn lead_days(&self) -> i64 {
        self.lead_days
    }

    /// Find a secondary slot for a primary candidate
    ///
    /// Returns `Ok(None)` when neither the cache nor the portal offers a
    /// slot inside the lead window; the candidate must then be skipped.
    pub async fn couple(
        &self,
        session: &mut SessionManager,
        poller: &Poller,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<SecondarySlot>> {
        let cached = self
            .cache
            .lookup(date, self.lead_days, &mut rand::thread_rng());
        if let Some(slot) = cached {
            debug!(primary = %date, secondary = %slot, "Secondary slot from cache");
            return Ok(Some(slot));
        }

        let coupling = Coupling::slot(&self.primary_facility_id, date, time);
        let dates = poller
            .available_dates(session, &self.secondary_facility_id, Some(coupling))
            .await?;

        let Some(secondary_date) = dates
            .into_iter()
            .find(|d| in_lead_window(*d, date, self.lead_days))
        else {
            debug!(primary = %date, "No secondary date inside lead window");
            return Ok(None);
        };

        let times = poller
            .available_times(
                session,
                &self.secondary_facility_id,
                secondary_date,
                Some(coupling),
            )
            .await?;

        Ok(times.first().map(|time| SecondarySlot {
            date: secondary_date,
            time: *time,
        }))
    }

    /// Rebuild the cache from the portal
    ///
    /// Failures keep the previous snapshot.
    pub async fn refresh(
        &mut self,
        session: &mut SessionManager,
        poller: &Poller,
        bounds: DateBounds,
    ) {
        match self.fetch_snapshot(session, poller, bounds).await {
            Ok(Some(fresh)) => {
                info!(dates = fresh.len(), "Secondary availability refreshed");
                self.cache = fresh;
            }
            Ok(None) => debug!("No secondary dates in bounds, keeping cache"),
            Err(e) => warn!(error = %e, "Secondary refresh failed, keeping cache"),
        }

        self.cache.prune(bounds);
        self.persist();
    }

    async fn fetch_snapshot(
        &self,
        session: &mut SessionManager,
        poller: &Poller,
        bounds: DateBounds,
    ) -> Result<Option<SecondaryCache>> {
        let coupling = Coupling::facility(&self.primary_facility_id);
        let dates: Vec<NaiveDate> = poller
            .available_dates(session, &self.secondary_facility_id, Some(coupling))
            .await?
            .into_iter()
            .filter(|d| bounds.contains(*d))
            .collect();

        if dates.is_empty() {
            return Ok(None);
        }

        let mut fresh = SecondaryCache::default();
        for date in dates {
            match poller
                .available_times(session, &self.secondary_facility_id, date, Some(coupling))
                .await
            {
                Ok(times) => fresh.insert(date, times),
                Err(e) => warn!(%date, error = %e, "Skipping secondary date"),
            }
        }
        Ok(Some(fresh))
    }

    fn persist(&self) {
        if let Some(path) = &self.cache_path {
            if let Err(e) = self.cache.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to save secondary cache");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DATE_FORMAT;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_lead_window() {
        let primary = date("2025-03-10");
        assert!(in_lead_window(date("2025-03-03"), primary, 7));
        assert!(in_lead_window(date("2025-03-09"), primary, 7));
        assert!(!in_lead_window(date("2025-03-02"), primary, 7));
        assert!(!in_lead_window(primary, primary, 7));
        assert!(!in_lead_window(date("2025-03-11"), primary, 7));
    }

    #[test]
    fn test_new_without_path_starts_empty() {
        let coupler = Coupler::new("94", "97", 7, None);
        assert!(coupler.cache().is_empty());
        assert_eq!(coupler.lead_days(), 7);
    }
}
