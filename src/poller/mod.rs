//! Availability polling
//!
//! Queries the portal's JSON endpoints for free dates and times of a
//! facility. Results are always sorted ascending without duplicates; an
//! empty list means nothing is free right now and is not an error.

use crate::error::{Error, Result};
use crate::models::{DATE_FORMAT, TIME_FORMAT};
use crate::parser;
use crate::portal::paths;
use crate::session::SessionManager;
use crate::utils::error::ParseError;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;

/// One entry of the available-days payload
#[derive(Debug, Clone, Deserialize)]
pub struct DayEntry {
    pub date: String,
}

/// Available-times payload
///
/// `available_times` is preferred; the portal sometimes leaves it empty and
/// fills `business_times` instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimesPayload {
    #[serde(default)]
    pub available_times: Option<Vec<String>>,

    #[serde(default)]
    pub business_times: Option<Vec<String>>,
}

impl TimesPayload {
    /// The time list the portal actually meant
    pub fn into_times(self) -> Vec<String> {
        match self.available_times {
            Some(times) if !times.is_empty() => times,
            _ => self.business_times.unwrap_or_default(),
        }
    }
}

/// Primary slot a secondary query is scoped to
#[derive(Debug, Clone, Copy)]
pub struct Coupling<'a> {
    pub primary_facility_id: &'a str,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
}

impl<'a> Coupling<'a> {
    /// Unscoped secondary query, used for cache refreshes
    pub fn facility(primary_facility_id: &'a str) -> Self {
        Self {
            primary_facility_id,
            date: None,
            time: None,
        }
    }

    /// Secondary query scoped to a primary candidate
    pub fn slot(primary_facility_id: &'a str, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            primary_facility_id,
            date: Some(date),
            time: Some(time),
        }
    }

    fn push_query(&self, query: &mut Vec<(&'static str, String)>) {
        query.push(("consulate_id", self.primary_facility_id.to_string()));
        query.push((
            "consulate_date",
            self.date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
        ));
        query.push((
            "consulate_time",
            self.time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
        ));
    }
}

/// Parse, sort and deduplicate portal dates
pub fn normalize_dates<I, S>(raw: I) -> std::result::Result<Vec<NaiveDate>, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let dates = raw
        .into_iter()
        .map(|value| parser::parse_date(value.as_ref()))
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(dates.into_iter().collect())
}

/// Parse, sort and deduplicate portal times
pub fn normalize_times<I, S>(raw: I) -> std::result::Result<Vec<NaiveTime>, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let times = raw
        .into_iter()
        .map(|value| parser::parse_time(value.as_ref()))
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(times.into_iter().collect())
}

/// Availability queries for one schedule
#[derive(Debug, Clone)]
pub struct Poller {
    schedule_id: String,
}

impl Poller {
    pub fn new(schedule_id: impl Into<String>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
        }
    }

    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    /// Free dates of a facility, earliest first
    ///
    /// `coupling` scopes a secondary facility query to a primary slot.
    pub async fn available_dates(
        &self,
        session: &mut SessionManager,
        facility_id: &str,
        coupling: Option<Coupling<'_>>,
    ) -> Result<Vec<NaiveDate>> {
        let mut query = Vec::new();
        if let Some(coupling) = &coupling {
            coupling.push_query(&mut query);
        }
        query.push(("appointments[expedite]", "false".to_string()));

        let path = paths::days(&self.schedule_id, facility_id);
        let entries: Vec<DayEntry> = self.fetch(session, &path, &query).await?;
        let dates = normalize_dates(entries.iter().map(|e| e.date.as_str()))?;

        debug!(
            schedule_id = %self.schedule_id,
            facility_id,
            count = dates.len(),
            first = ?dates.first(),
            "Available dates"
        );
        Ok(dates)
    }

    /// Free times of a facility on a date, earliest first
    pub async fn available_times(
        &self,
        session: &mut SessionManager,
        facility_id: &str,
        date: NaiveDate,
        coupling: Option<Coupling<'_>>,
    ) -> Result<Vec<NaiveTime>> {
        let mut query = vec![("date", date.format(DATE_FORMAT).to_string())];
        if let Some(coupling) = &coupling {
            coupling.push_query(&mut query);
        }
        query.push(("appointments[expedite]", "false".to_string()));

        let path = paths::times(&self.schedule_id, facility_id);
        let payload: TimesPayload = self.fetch(session, &path, &query).await?;
        let times = normalize_times(payload.into_times())?;

        debug!(
            schedule_id = %self.schedule_id,
            facility_id,
            %date,
            count = times.len(),
            "Available times"
        );
        Ok(times)
    }

    async fn fetch<T>(
        &self,
        session: &mut SessionManager,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let referer = paths::appointment(&self.schedule_id);
        let referer = referer.as_str();

        session
            .authorized(|client, context| async move {
                let pairs: Vec<(&str, &str)> =
                    query.iter().map(|(k, v)| (*k, v.as_str())).collect();
                let body = client
                    .get_json(path, &pairs, referer, context.credentials())
                    .await?;
                Ok::<T, Error>(body)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_normalize_dates_sorts_and_dedups() {
        let dates = normalize_dates(["2025-01-20", "2025-01-10", "2025-01-20"]).unwrap();
        assert_eq!(dates, vec![date("2025-01-10"), date("2025-01-20")]);
    }

    #[test]
    fn test_normalize_rejects_malformed_values() {
        assert!(matches!(
            normalize_dates(["2025-13-01"]),
            Err(ParseError::InvalidDate(_))
        ));
        assert!(matches!(
            normalize_times(["25:00"]),
            Err(ParseError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_times_payload_fallback() {
        let payload: TimesPayload =
            serde_json::from_str(r#"{"available_times": [], "business_times": ["09:00"]}"#)
                .unwrap();
        assert_eq!(payload.into_times(), vec!["09:00".to_string()]);

        let payload: TimesPayload =
            serde_json::from_str(r#"{"available_times": null, "business_times": null}"#).unwrap();
        assert!(payload.into_times().is_empty());

        let payload: TimesPayload = serde_json::from_str(
            r#"{"available_times": ["08:15"], "business_times": ["09:00"]}"#,
        )
        .unwrap();
        assert_eq!(payload.into_times(), vec!["08:15".to_string()]);
    }

    #[test]
    fn test_coupling_query() {
        let mut query = Vec::new();
        Coupling::slot(
            "94",
            date("2025-03-10"),
            NaiveTime::from_hms_opt(8, 15, 0).unwrap(),
        )
        .push_query(&mut query);

        assert_eq!(
            query,
            vec![
                ("consulate_id", "94".to_string()),
                ("consulate_date", "2025-03-10".to_string()),
                ("consulate_time", "08:15".to_string()),
            ]
        );

        let mut query = Vec::new();
        Coupling::facility("94").push_query(&mut query);
        assert_eq!(query[1], ("consulate_date", String::new()));
    }
}
