//! Application state: the running hour total and the per-day archives.
//!
//! The state is one JSON blob owned by the web app. Only `currentHours` and
//! `archives[year][date].hours` are interpreted here; every other field is
//! carried through untouched so a background write never drops app data.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, StorageError};
use crate::storage::{KeyValueStore, KvWrite};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayEntry {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub hours: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub current_hours: f64,
    #[serde(default)]
    pub archives: BTreeMap<String, BTreeMap<String, DayEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The web app serialises `NaN` totals as `null`; read those as zero.
fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl ApplicationState {
    pub fn day(&self, date: NaiveDate) -> Option<&DayEntry> {
        self.archives
            .get(&service_year(date))
            .and_then(|days| days.get(&date_key(date)))
    }

    pub fn year_total(&self, service_year: &str) -> f64 {
        self.archives
            .get(service_year)
            .map(|days| days.values().map(|d| d.hours).sum())
            .unwrap_or(0.0)
    }
}

/// `YYYY-MM-DD`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Service years run September through August: `"2024-2025"` covers
/// 2024-09-01 up to 2025-08-31.
pub fn service_year(date: NaiveDate) -> String {
    let start = if date.month() >= 9 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start, start + 1)
}

/// Add `hours` to the running total and to the day's archive entry,
/// creating the year and day if absent.
pub fn record_hours(state: &mut ApplicationState, hours: f64, date: NaiveDate) {
    state.current_hours += hours;
    let entry = state
        .archives
        .entry(service_year(date))
        .or_default()
        .entry(date_key(date))
        .or_default();
    entry.hours += hours;
}

/// Receives finished session hours from the foreground timer.
pub trait HourSink {
    fn add_hours(&self, hours: f64, date: NaiveDate) -> Result<(), CoreError>;
}

/// The stored application state, read and written as a whole.
pub struct Ledger<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> Ledger<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Load the state. A missing blob is a fresh default state.
    ///
    /// # Errors
    /// Returns `CoreError::Json` when the stored blob does not parse.
    pub fn load(&self) -> Result<ApplicationState, CoreError> {
        parse_state(self.store.get(&self.key)?)
    }

    pub fn save(&self, state: &ApplicationState) -> Result<(), CoreError> {
        let raw = serde_json::to_string(state)?;
        self.store.set(&self.key, &raw).map_err(CoreError::from)
    }

    /// Read the full state, add `hours`, write the full state back, all in
    /// one storage transaction.
    pub fn add(&self, hours: f64, date: NaiveDate) -> Result<ApplicationState, CoreError> {
        let state = self.store.update(|current| -> Result<_, CoreError> {
            let mut state = parse_state(current.read(&self.key)?)?;
            record_hours(&mut state, hours, date);
            let raw = serde_json::to_string(&state)?;
            Ok((state, vec![KvWrite::set(&self.key, raw)]))
        })?;
        tracing::info!(
            hours,
            date = %date_key(date),
            service_year = %service_year(date),
            total = state.current_hours,
            "hours recorded"
        );
        Ok(state)
    }

    pub fn raw(&self) -> Result<Option<String>, StorageError> {
        self.store.get(&self.key)
    }
}

fn parse_state(raw: Option<String>) -> Result<ApplicationState, CoreError> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(ApplicationState::default()),
    }
}

impl<S: KeyValueStore> HourSink for Ledger<S> {
    fn add_hours(&self, hours: f64, date: NaiveDate) -> Result<(), CoreError> {
        self.add(hours, date).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn service_year_boundaries() {
        assert_eq!(service_year(date(2024, 9, 15)), "2024-2025");
        assert_eq!(service_year(date(2024, 3, 1)), "2023-2024");
        assert_eq!(service_year(date(2024, 8, 31)), "2023-2024");
        assert_eq!(service_year(date(2024, 9, 1)), "2024-2025");
        assert_eq!(service_year(date(2024, 12, 31)), "2024-2025");
        assert_eq!(service_year(date(2025, 1, 1)), "2024-2025");
    }

    #[test]
    fn date_key_is_zero_padded() {
        assert_eq!(date_key(date(2024, 3, 1)), "2024-03-01");
    }

    #[test]
    fn record_hours_creates_and_accumulates() {
        let mut state = ApplicationState::default();
        record_hours(&mut state, 1.5, date(2024, 9, 15));
        record_hours(&mut state, 0.25, date(2024, 9, 15));
        record_hours(&mut state, 2.0, date(2024, 3, 1));
        assert_eq!(state.current_hours, 3.75);
        assert_eq!(state.day(date(2024, 9, 15)).unwrap().hours, 1.75);
        assert_eq!(state.year_total("2023-2024"), 2.0);
    }

    #[test]
    fn unknown_fields_survive_a_write() {
        let store = MemoryStore::new();
        store
            .set(
                "garden-service-tracker",
                r#"{"currentHours":2,"goal":50,"archives":{"2024-2025":{"2024-09-15":{"hours":1,"studies":3}}}}"#,
            )
            .unwrap();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        ledger.add(0.5, date(2024, 9, 15)).unwrap();

        let raw: Value = serde_json::from_str(&ledger.raw().unwrap().unwrap()).unwrap();
        assert_eq!(raw["goal"], 50);
        assert_eq!(raw["currentHours"], 2.5);
        assert_eq!(raw["archives"]["2024-2025"]["2024-09-15"]["studies"], 3);
        assert_eq!(raw["archives"]["2024-2025"]["2024-09-15"]["hours"], 1.5);
    }

    #[test]
    fn missing_blob_starts_fresh() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        let state = ledger.add(1.0, date(2025, 2, 10)).unwrap();
        assert_eq!(state.current_hours, 1.0);
        assert_eq!(state.year_total("2024-2025"), 1.0);
    }

    #[test]
    fn corrupt_blob_is_an_error_and_left_alone() {
        let store = MemoryStore::new();
        store.set("garden-service-tracker", "{not json").unwrap();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        assert!(matches!(ledger.add(1.0, date(2025, 2, 10)), Err(CoreError::Json(_))));
        assert_eq!(ledger.raw().unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn null_hours_read_as_zero() {
        let store = MemoryStore::new();
        store
            .set(
                "garden-service-tracker",
                r#"{"currentHours":null,"archives":{"2024-2025":{"2024-09-15":{"hours":null,"note":"x"}}}}"#,
            )
            .unwrap();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        assert_eq!(ledger.load().unwrap().current_hours, 0.0);

        let state = ledger.add(1.5, date(2024, 9, 15)).unwrap();
        assert_eq!(state.current_hours, 1.5);
        let day = state.day(date(2024, 9, 15)).unwrap();
        assert_eq!(day.hours, 1.5);
        assert_eq!(day.extra["note"], "x");
    }
}
