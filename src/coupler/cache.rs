//! On-disk snapshot of secondary facility availability
//!
//! Stored as a JSON object mapping `YYYY-MM-DD` to a list of `HH:MM` times.

use crate::error::Result;
use crate::models::{DateBounds, SecondarySlot, DATE_FORMAT, TIME_FORMAT};
use crate::parser::{parse_date, parse_time};
use chrono::{NaiveDate, NaiveTime};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use super::window_start;

/// Secondary availability keyed by date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecondaryCache {
    slots: BTreeMap<NaiveDate, Vec<NaiveTime>>,
}

impl SecondaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot, returning an empty cache if missing or corrupted
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str::<BTreeMap<String, Vec<String>>>(&content) {
            Ok(raw) => Self::from_raw(raw),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupted secondary cache");
                Self::default()
            }
        }
    }

    fn from_raw(raw: BTreeMap<String, Vec<String>>) -> Self {
        let slots = raw
            .into_iter()
            .filter_map(|(date, times)| {
                let date = parse_date(&date).ok()?;
                let mut times: Vec<NaiveTime> =
                    times.iter().filter_map(|t| parse_time(t).ok()).collect();
                times.sort();
                times.dedup();
                Some((date, times))
            })
            .collect();
        Self { slots }
    }

    /// Save the snapshot atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let raw: BTreeMap<String, Vec<String>> = self
            .slots
            .iter()
            .map(|(date, times)| {
                (
                    date.format(DATE_FORMAT).to_string(),
                    times
                        .iter()
                        .map(|t| t.format(TIME_FORMAT).to_string())
                        .collect(),
                )
            })
            .collect();

        // Atomic write using temp file
        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(&raw)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Record the free times of a date, sorted
    pub fn insert(&mut self, date: NaiveDate, mut times: Vec<NaiveTime>) {
        times.sort();
        times.dedup();
        self.slots.insert(date, times);
    }

    pub fn get(&self, date: NaiveDate) -> Option<&[NaiveTime]> {
        self.slots.get(&date).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cached dates, earliest first
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.slots.keys().copied()
    }

    /// Drop dates outside the account's booking window
    pub fn prune(&mut self, bounds: DateBounds) {
        self.slots.retain(|date, _| bounds.contains(*date));
    }

    /// Find a cached slot for a primary date
    ///
    /// Takes the earliest cached date inside the lead window that still has
    /// times, and a random one of its times.
    pub fn lookup<R: Rng + ?Sized>(
        &self,
        primary: NaiveDate,
        lead_days: i64,
        rng: &mut R,
    ) -> Option<SecondarySlot> {
        let start = window_start(primary, lead_days);
        if start >= primary {
            return None;
        }

        self.slots
            .range(start..primary)
            .find(|(_, times)| !times.is_empty())
            .and_then(|(date, times)| {
                times.choose(rng).map(|time| SecondarySlot {
                    date: *date,
                    time: *time,
                })
            })
    }
}
