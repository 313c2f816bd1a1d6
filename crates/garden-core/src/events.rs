use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::ResponseSource;
use crate::timer::TimerStatus;

/// Every state change in the system produces an Event.
/// The CLI prints them; a UI layer renders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        base_secs: f64,
        notified: bool,
        at: DateTime<Utc>,
    },
    TimerPaused {
        elapsed_secs: f64,
        at: DateTime<Utc>,
    },
    /// Session finished. `logged` is false when it fell under the noise
    /// threshold and was discarded.
    TimerFinished {
        elapsed_secs: f64,
        hours: f64,
        logged: bool,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    TimerSnapshot {
        status: TimerStatus,
        elapsed_secs: f64,
        display: String,
        at: DateTime<Utc>,
    },
    /// Pause applied from a notification action.
    BackgroundPaused {
        elapsed_secs: f64,
        at: DateTime<Utc>,
    },
    /// Finish applied from a notification action.
    BackgroundFinished {
        elapsed_secs: f64,
        hours: f64,
        logged: bool,
        at: DateTime<Utc>,
    },
    /// The app was brought to the foreground by a notification tap.
    AppOpened {
        url: String,
        at: DateTime<Utc>,
    },
    CacheInstalled {
        generation: String,
        entries: usize,
        at: DateTime<Utc>,
    },
    CacheActivated {
        generation: String,
        evicted: Vec<String>,
        at: DateTime<Utc>,
    },
    Fetched {
        url: String,
        status: u16,
        source: ResponseSource,
        at: DateTime<Utc>,
    },
}
