//! Persistent timer state.
//!
//! The record is two fields in the shared key-value store: the anchor
//! instant of the current run (epoch milliseconds) and the seconds
//! accumulated before it. The foreground engine and the background handler
//! both go through this module, so there is a single fold implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage::{KeyValueStore, KvRead, KvWrite, StorageKeys};

/// Sessions at or below this many hours (about 36 seconds) are noise.
pub const DISCARD_THRESHOLD_HOURS: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimerRecord {
    /// Instant the current run segment began. `None` when not running.
    pub start: Option<DateTime<Utc>>,
    /// Seconds accumulated by earlier run segments.
    pub base_secs: f64,
}

impl TimerRecord {
    pub fn running_since(start: DateTime<Utc>, base_secs: f64) -> Self {
        Self {
            start: Some(start),
            base_secs,
        }
    }

    pub fn status(&self) -> TimerStatus {
        match self.start {
            Some(_) => TimerStatus::Running,
            None if self.base_secs > 0.0 => TimerStatus::Paused,
            None => TimerStatus::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.start.is_some()
    }

    /// Live elapsed seconds, derived from the anchor rather than counted.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        self.base_secs + self.segment_secs(now)
    }

    /// Fold the running segment into the base and clear the anchor.
    pub fn fold(&self, now: DateTime<Utc>) -> Self {
        Self {
            start: None,
            base_secs: self.elapsed_secs(now),
        }
    }

    /// Begin a new run segment at `now`, keeping the accumulated base.
    pub fn resume(&self, now: DateTime<Utc>) -> Self {
        Self {
            start: Some(now),
            base_secs: self.base_secs,
        }
    }

    fn segment_secs(&self, now: DateTime<Utc>) -> f64 {
        match self.start {
            // A clock that moved backwards contributes nothing.
            Some(start) => ((now - start).num_milliseconds() as f64 / 1000.0).max(0.0),
            None => 0.0,
        }
    }

    /// Read the record. Unparsable fields read as absent/zero.
    pub fn load<R: KvRead + ?Sized>(store: &R, keys: &StorageKeys) -> Result<Self, StorageError> {
        let start = store
            .read(&keys.start_key)?
            .and_then(|raw| parse_start(&keys.start_key, &raw));
        let base_secs = store
            .read(&keys.base_key)?
            .map(|raw| parse_base(&keys.base_key, &raw))
            .unwrap_or(0.0);
        Ok(Self { start, base_secs })
    }

    /// The batch that persists this record. A zero base is removed.
    pub fn writes(&self, keys: &StorageKeys) -> Vec<KvWrite> {
        let start = match self.start {
            Some(start) => KvWrite::set(&keys.start_key, start.timestamp_millis().to_string()),
            None => KvWrite::remove(&keys.start_key),
        };
        let base = if self.base_secs > 0.0 {
            KvWrite::set(&keys.base_key, self.base_secs.to_string())
        } else {
            KvWrite::remove(&keys.base_key)
        };
        vec![start, base]
    }

    /// Write both fields in one batch.
    pub fn save<S: KeyValueStore>(
        &self,
        store: &S,
        keys: &StorageKeys,
    ) -> Result<(), StorageError> {
        store.apply(&self.writes(keys))
    }

    /// Remove both fields.
    pub fn clear<S: KeyValueStore>(store: &S, keys: &StorageKeys) -> Result<(), StorageError> {
        Self::default().save(store, keys)
    }

    /// Load the record, let `step` choose what replaces it, and store that
    /// in the same transaction. `step` returns `None` to leave the record
    /// untouched.
    ///
    /// Every transition that starts from the stored record goes through
    /// here, so a foreground action and a notification action racing on the
    /// same record cannot both act on the state they read.
    pub fn transition<S, T>(
        store: &S,
        keys: &StorageKeys,
        step: impl FnOnce(Self) -> Option<(Self, T)>,
    ) -> Result<Option<T>, StorageError>
    where
        S: KeyValueStore,
    {
        store.update(|current| -> Result<_, StorageError> {
            let record = Self::load(current, keys)?;
            Ok(match step(record) {
                Some((next, outcome)) => (Some(outcome), next.writes(keys)),
                None => (None, Vec::new()),
            })
        })
    }

    pub fn hours(secs: f64) -> f64 {
        secs / 3600.0
    }

    /// Whether a session of `hours` is long enough to be logged.
    pub fn worth_logging(hours: f64) -> bool {
        hours > DISCARD_THRESHOLD_HOURS
    }
}

fn parse_start(key: &str, raw: &str) -> Option<DateTime<Utc>> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|ms| ms.is_finite())
        .and_then(|ms| DateTime::from_timestamp_millis(ms as i64));
    if parsed.is_none() {
        tracing::warn!(key, raw, "stored timer anchor is corrupt, treating timer as stopped");
    }
    parsed
}

fn parse_base(key: &str, raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => secs,
        _ => {
            tracing::warn!(key, raw, "stored timer base is corrupt, treating as zero");
            0.0
        }
    }
}

/// Format seconds as `HH:MM:SS`.
pub fn format_hms(total_secs: f64) -> String {
    let total = total_secs.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
