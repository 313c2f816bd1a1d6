//! # Garden Core Library
//!
//! Core logic for the Garden service-hours tracker: a persistent stopwatch
//! whose finished sessions are added to a per-day ledger, plus the offline
//! shell cache and notification handling that let it keep working while the
//! app is closed.
//!
//! All operations are available through the `garden-cli` binary; any UI is a
//! thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer**: An anchor-timestamp stopwatch. Elapsed time is always
//!   recomputed from the stored start instant, so nothing depends on a
//!   ticking loop staying alive.
//! - **Ledger**: Hours grouped by service year and calendar day, stored as a
//!   single JSON blob.
//! - **Background**: Notification-action handling that mutates the same
//!   persisted timer and ledger as the foreground.
//! - **Cache**: Versioned shell precache with network-first navigation and
//!   cache-first assets.
//! - **Storage**: SQLite key-value and cache tables, TOML configuration.
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Foreground timer operations
//! - [`Ledger`]: Service-hours persistence
//! - [`BackgroundActionHandler`]: Notification click handling
//! - [`CacheController`]: Offline shell lifecycle and fetch policy
//! - [`Database`]: Durable storage
//! - [`Config`]: Application configuration management

pub mod background;
pub mod cache;
pub mod clock;
pub mod error;
pub mod events;
pub mod ledger;
pub mod notify;
pub mod storage;
pub mod timer;

pub use background::{BackgroundActionHandler, NotificationAction, NotificationClick};
pub use cache::{CacheController, CacheStatus, FetchOutcome, HttpFetcher, Request, Response};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, ConfigError, CoreError, NotifyError, StorageError};
pub use events::Event;
pub use ledger::{ApplicationState, HourSink, Ledger};
pub use notify::{AppWindow, MemoryNotifier, NoNotifier, Notifier, PermissionStatus};
pub use storage::{Config, Database, KeyValueStore, MemoryStore};
pub use timer::{TimerEngine, TimerStatus};
