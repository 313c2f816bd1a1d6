//! Timer engine implementation.
//!
//! The engine keeps no elapsed counter of its own. Every query and command
//! re-reads the persisted [`TimerRecord`] and derives the live time from its
//! anchor, so the display heals itself after a suspend, a crash or a pause
//! applied by the background handler.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running ... -> (finish | reset) -> Idle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::from_config(&db, &config, Box::new(SystemClock), notifier);
//! engine.start()?;
//! // Once a second:
//! engine.tick()?; // Some(Event::TimerSnapshot) while running
//! engine.finish(&ledger)?;
//! ```

use crate::clock::Clock;
use crate::error::{CoreError, NotifyError};
use crate::events::Event;
use crate::ledger::HourSink;
use crate::notify::{cancel_quietly, Notifier, OngoingNotification, PermissionStatus};
use crate::storage::{Config, KeyValueStore, StorageKeys};

use super::record::{format_hms, TimerRecord, TimerStatus};

/// Foreground timer.
pub struct TimerEngine<S> {
    store: S,
    keys: StorageKeys,
    clock: Box<dyn Clock>,
    notifier: Box<dyn Notifier>,
    notification: OngoingNotification,
    /// Last known permission; `None` until first asked.
    permission: Option<PermissionStatus>,
}

impl<S: KeyValueStore> TimerEngine<S> {
    pub fn new(
        store: S,
        keys: StorageKeys,
        clock: Box<dyn Clock>,
        notifier: Box<dyn Notifier>,
        notification: OngoingNotification,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            notifier,
            notification,
            permission: None,
        }
    }

    pub fn from_config(
        store: S,
        config: &Config,
        clock: Box<dyn Clock>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let n = &config.notifications;
        Self::new(
            store,
            config.storage.clone(),
            clock,
            notifier,
            OngoingNotification::new(n.timer_id, &n.title, &n.body),
        )
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn record(&self) -> Result<TimerRecord, CoreError> {
        Ok(TimerRecord::load(&self.store, &self.keys)?)
    }

    pub fn status(&self) -> Result<TimerStatus, CoreError> {
        Ok(self.record()?.status())
    }

    pub fn elapsed_secs(&self) -> Result<f64, CoreError> {
        Ok(self.record()?.elapsed_secs(self.clock.now()))
    }

    pub fn permission(&self) -> Option<PermissionStatus> {
        self.permission
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Result<Event, CoreError> {
        let record = self.record()?;
        let now = self.clock.now();
        let elapsed_secs = record.elapsed_secs(now);
        Ok(Event::TimerSnapshot {
            status: record.status(),
            elapsed_secs,
            display: format_hms(elapsed_secs),
            at: now,
        })
    }

    /// Call once a second. Returns a fresh snapshot while running.
    pub fn tick(&self) -> Result<Option<Event>, CoreError> {
        if !self.record()?.is_running() {
            return Ok(None);
        }
        self.snapshot().map(Some)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<Option<Event>, CoreError> {
        if self.record()?.is_running() {
            return Ok(None);
        }

        // Resolve permission before the anchor is written, as the UI does.
        let permission = self.ensure_permission();

        let now = self.clock.now();
        let resumed = TimerRecord::transition(&self.store, &self.keys, |record| {
            (!record.is_running()).then(|| (record.resume(now), record.base_secs))
        })?;
        let Some(base_secs) = resumed else {
            return Ok(None);
        };

        let notified = permission == Some(PermissionStatus::Granted) && self.post_notification();
        tracing::debug!(base_secs, notified, "timer started");

        Ok(Some(Event::TimerStarted {
            base_secs,
            notified,
            at: now,
        }))
    }

    pub fn pause(&mut self) -> Result<Option<Event>, CoreError> {
        let now = self.clock.now();
        let paused = TimerRecord::transition(&self.store, &self.keys, |record| {
            record.is_running().then(|| {
                let folded = record.fold(now);
                (folded, folded.base_secs)
            })
        })?;
        let Some(elapsed_secs) = paused else {
            return Ok(None);
        };

        cancel_quietly(self.notifier.as_ref(), self.notification.id);
        tracing::debug!(elapsed_secs, "timer paused");

        Ok(Some(Event::TimerPaused {
            elapsed_secs,
            at: now,
        }))
    }

    /// Finish the session, handing its hours to `sink` when it is long
    /// enough to count. The stored timer is cleared either way.
    ///
    /// The elapsed time is read and the record cleared in one transaction,
    /// so a session finished from the notification in the meantime is not
    /// logged a second time.
    pub fn finish(&mut self, sink: &dyn HourSink) -> Result<Option<Event>, CoreError> {
        let now = self.clock.now();
        let finished = TimerRecord::transition(&self.store, &self.keys, |record| {
            let elapsed_secs = record.elapsed_secs(now);
            (elapsed_secs > 0.0).then_some((TimerRecord::default(), elapsed_secs))
        })?;
        let Some(elapsed_secs) = finished else {
            return Ok(None);
        };

        cancel_quietly(self.notifier.as_ref(), self.notification.id);

        let hours = TimerRecord::hours(elapsed_secs);
        let mut logged = false;
        if TimerRecord::worth_logging(hours) {
            match sink.add_hours(hours, self.clock.today()) {
                Ok(()) => logged = true,
                Err(e) => tracing::error!(hours, error = %e, "failed to record finished session"),
            }
        } else {
            tracing::debug!(elapsed_secs, "session too short, discarded");
        }

        Ok(Some(Event::TimerFinished {
            elapsed_secs,
            hours,
            logged,
            at: now,
        }))
    }

    pub fn reset(&mut self) -> Result<Option<Event>, CoreError> {
        TimerRecord::clear(&self.store, &self.keys)?;
        cancel_quietly(self.notifier.as_ref(), self.notification.id);
        Ok(Some(Event::TimerReset {
            at: self.clock.now(),
        }))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn ensure_permission(&mut self) -> Option<PermissionStatus> {
        let current = match self.permission {
            Some(status) => status,
            None => match self.notifier.check_permission() {
                Ok(status) => status,
                Err(NotifyError::Unsupported) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read notification permission");
                    return None;
                }
            },
        };

        let resolved = if current == PermissionStatus::Prompt {
            match self.notifier.request_permission() {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(error = %e, "notification permission request failed");
                    return None;
                }
            }
        } else {
            current
        };

        self.permission = Some(resolved);
        Some(resolved)
    }

    fn post_notification(&self) -> bool {
        match self.notifier.schedule(&self.notification) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    id = self.notification.id,
                    error = %e,
                    "failed to post timer notification"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{BackgroundActionHandler, NotificationAction};
    use crate::clock::ManualClock;
    use crate::error::StorageError;
    use crate::ledger::Ledger;
    use crate::notify::{AppWindow, MemoryNotifier, NoNotifier};
    use crate::storage::{KvRead, KvWrite, MemoryStore};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::cell::RefCell;
    use std::sync::Arc;

    /// Store that lets another context act just before the next update.
    struct Interleaved<'a> {
        inner: &'a MemoryStore,
        rival: RefCell<Option<Box<dyn FnOnce() + 'a>>>,
    }

    impl KeyValueStore for Interleaved<'_> {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn apply(&self, batch: &[KvWrite]) -> Result<(), StorageError> {
            self.inner.apply(batch)
        }

        fn update<T, E>(
            &self,
            f: impl FnOnce(&dyn KvRead) -> Result<(T, Vec<KvWrite>), E>,
        ) -> Result<T, E>
        where
            E: From<StorageError>,
        {
            let rival = self.rival.borrow_mut().take();
            if let Some(rival) = rival {
                rival();
            }
            self.inner.update(f)
        }
    }

    struct NoWindow;

    impl AppWindow for NoWindow {
        fn focus_or_open(&self, _url: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 9, 15, 9, 0, 0).unwrap(),
        ))
    }

    fn engine<'a>(
        store: &'a MemoryStore,
        clock: &Arc<ManualClock>,
        notifier: Box<dyn Notifier>,
    ) -> TimerEngine<&'a MemoryStore> {
        TimerEngine::from_config(store, &Config::default(), Box::new(clock.clone()), notifier)
    }

    #[test]
    fn start_pause_resume() {
        let store = MemoryStore::new();
        let clock = clock();
        let mut engine = engine(&store, &clock, Box::new(NoNotifier));
        assert_eq!(engine.status().unwrap(), TimerStatus::Idle);

        assert!(engine.start().unwrap().is_some());
        assert_eq!(engine.status().unwrap(), TimerStatus::Running);
        assert!(engine.start().unwrap().is_none(), "already running");

        clock.advance_secs(60);
        assert!(engine.pause().unwrap().is_some());
        assert_eq!(engine.status().unwrap(), TimerStatus::Paused);
        assert!(engine.pause().unwrap().is_none(), "pause is idempotent");

        clock.advance_secs(600);
        assert_eq!(engine.elapsed_secs().unwrap(), 60.0);

        assert!(engine.start().unwrap().is_some());
        clock.advance_secs(30);
        assert_eq!(engine.elapsed_secs().unwrap(), 90.0);
    }

    #[test]
    fn tick_recomputes_from_anchor() {
        let store = MemoryStore::new();
        let clock = clock();
        let mut engine = engine(&store, &clock, Box::new(NoNotifier));
        assert!(engine.tick().unwrap().is_none());

        engine.start().unwrap();
        // A long suspend between ticks is still counted.
        clock.advance_secs(3725);
        match engine.tick().unwrap() {
            Some(Event::TimerSnapshot {
                status,
                elapsed_secs,
                display,
                ..
            }) => {
                assert_eq!(status, TimerStatus::Running);
                assert_eq!(elapsed_secs, 3725.0);
                assert_eq!(display, "01:02:05");
            }
            other => panic!("Expected TimerSnapshot, got {other:?}"),
        }
    }

    #[test]
    fn restart_picks_up_persisted_run() {
        let store = MemoryStore::new();
        let clock = clock();
        engine(&store, &clock, Box::new(NoNotifier)).start().unwrap();
        clock.advance_secs(120);

        // A new engine over the same storage, as after an app reload.
        let reloaded = engine(&store, &clock, Box::new(NoNotifier));
        assert_eq!(reloaded.status().unwrap(), TimerStatus::Running);
        assert_eq!(reloaded.elapsed_secs().unwrap(), 120.0);
    }

    #[test]
    fn finish_logs_hours_and_clears() {
        let store = MemoryStore::new();
        let clock = clock();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        let mut engine = engine(&store, &clock, Box::new(NoNotifier));

        engine.start().unwrap();
        clock.advance_secs(1800);
        match engine.finish(&ledger).unwrap() {
            Some(Event::TimerFinished { hours, logged, .. }) => {
                assert_eq!(hours, 0.5);
                assert!(logged);
            }
            other => panic!("Expected TimerFinished, got {other:?}"),
        }
        assert_eq!(engine.record().unwrap(), TimerRecord::default());

        let state = ledger.load().unwrap();
        assert_eq!(state.current_hours, 0.5);
        let day = NaiveDate::from_ymd_opt(2024, 9, 15).unwrap();
        assert_eq!(state.day(day).unwrap().hours, 0.5);
    }

    #[test]
    fn short_session_is_discarded_but_cleared() {
        let store = MemoryStore::new();
        let clock = clock();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        let mut engine = engine(&store, &clock, Box::new(NoNotifier));

        engine.start().unwrap();
        clock.advance_secs(36);
        match engine.finish(&ledger).unwrap() {
            Some(Event::TimerFinished { logged, .. }) => assert!(!logged),
            other => panic!("Expected TimerFinished, got {other:?}"),
        }
        assert!(store.is_empty(), "nothing stored: no timer, no ledger");
    }

    #[test]
    fn finish_with_no_time_is_a_no_op() {
        let store = MemoryStore::new();
        let clock = clock();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        let mut engine = engine(&store, &clock, Box::new(NoNotifier));
        assert!(engine.finish(&ledger).unwrap().is_none());
    }

    #[test]
    fn reset_never_touches_ledger() {
        let store = MemoryStore::new();
        let clock = clock();
        let mut engine = engine(&store, &clock, Box::new(NoNotifier));
        engine.start().unwrap();
        clock.advance_secs(4000);
        engine.pause().unwrap();
        engine.reset().unwrap();
        assert_eq!(engine.record().unwrap(), TimerRecord::default());
        assert!(store.get("garden-service-tracker").unwrap().is_none());
    }

    #[test]
    fn notification_follows_running_state() {
        let store = MemoryStore::new();
        let clock = clock();
        let notifier = MemoryNotifier::new(PermissionStatus::Granted);
        let mut engine = engine(&store, &clock, Box::new(notifier.clone()));

        match engine.start().unwrap() {
            Some(Event::TimerStarted { notified, .. }) => assert!(notified),
            other => panic!("Expected TimerStarted, got {other:?}"),
        }
        let posted = notifier.active();
        assert_eq!(posted.len(), 1);
        assert!(posted[0].ongoing);
        assert_eq!(posted[0].title, "Temporizador en curso");

        engine.pause().unwrap();
        assert!(notifier.active().is_empty());

        engine.start().unwrap();
        engine.reset().unwrap();
        assert!(notifier.active().is_empty());
    }

    #[test]
    fn prompt_is_requested_once_then_remembered() {
        let store = MemoryStore::new();
        let clock = clock();
        let notifier = MemoryNotifier::prompting(true);
        let mut engine = engine(&store, &clock, Box::new(notifier.clone()));

        engine.start().unwrap();
        engine.pause().unwrap();
        engine.start().unwrap();
        assert_eq!(notifier.permission_requests(), 1);
        assert_eq!(engine.permission(), Some(PermissionStatus::Granted));
        assert!(notifier.is_active(1));
    }

    #[test]
    fn denied_permission_still_runs() {
        let store = MemoryStore::new();
        let clock = clock();
        let notifier = MemoryNotifier::prompting(false);
        let mut engine = engine(&store, &clock, Box::new(notifier.clone()));

        match engine.start().unwrap() {
            Some(Event::TimerStarted { notified, .. }) => assert!(!notified),
            other => panic!("Expected TimerStarted, got {other:?}"),
        }
        assert_eq!(engine.status().unwrap(), TimerStatus::Running);
        assert!(notifier.active().is_empty());
    }

    #[test]
    fn schedule_failure_does_not_block_start() {
        let store = MemoryStore::new();
        let clock = clock();
        let notifier = MemoryNotifier::new(PermissionStatus::Granted).failing_schedule();
        let mut engine = engine(&store, &clock, Box::new(notifier));
        assert!(engine.start().unwrap().is_some());
        assert_eq!(engine.status().unwrap(), TimerStatus::Running);
    }

    #[test]
    fn corrupt_ledger_does_not_block_finish() {
        let store = MemoryStore::new();
        store.set("garden-service-tracker", "{oops").unwrap();
        let clock = clock();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        let mut engine = engine(&store, &clock, Box::new(NoNotifier));

        engine.start().unwrap();
        clock.advance_secs(3600);
        match engine.finish(&ledger).unwrap() {
            Some(Event::TimerFinished { logged, .. }) => assert!(!logged),
            other => panic!("Expected TimerFinished, got {other:?}"),
        }
        assert_eq!(engine.status().unwrap(), TimerStatus::Idle);
    }

    #[test]
    fn finish_after_background_finish_logs_once() {
        let store = MemoryStore::new();
        let clock = clock();
        let ledger = Ledger::new(&store, "garden-service-tracker");
        let interleaved = Interleaved {
            inner: &store,
            rival: RefCell::new(None),
        };
        let mut engine = TimerEngine::from_config(
            &interleaved,
            &Config::default(),
            Box::new(clock.clone()),
            Box::new(NoNotifier),
        );
        engine.start().unwrap();
        clock.advance_secs(3600);
        assert!(engine.record().unwrap().is_running());

        // The notification's finish lands after the engine saw a running
        // timer but before its own transaction.
        let background = BackgroundActionHandler::from_config(
            &store,
            &Config::default(),
            Box::new(clock.clone()),
            Box::new(NoNotifier),
            Box::new(NoWindow),
        );
        *interleaved.rival.borrow_mut() = Some(Box::new(move || {
            let event = background.handle_action(NotificationAction::Finish).unwrap();
            assert!(matches!(event, Some(Event::BackgroundFinished { logged: true, .. })));
        }));

        assert!(engine.finish(&ledger).unwrap().is_none());
        assert_eq!(ledger.load().unwrap().current_hours, 1.0);
        assert_eq!(engine.status().unwrap(), TimerStatus::Idle);
    }

    #[test]
    fn pause_after_background_finish_is_a_no_op() {
        let store = MemoryStore::new();
        let clock = clock();
        let interleaved = Interleaved {
            inner: &store,
            rival: RefCell::new(None),
        };
        let mut engine = TimerEngine::from_config(
            &interleaved,
            &Config::default(),
            Box::new(clock.clone()),
            Box::new(NoNotifier),
        );
        engine.start().unwrap();
        clock.advance_secs(600);

        let keys = StorageKeys::default();
        let store_ref = &store;
        *interleaved.rival.borrow_mut() = Some(Box::new(move || {
            TimerRecord::clear(store_ref, &keys).unwrap();
        }));

        assert!(engine.pause().unwrap().is_none());
        assert_eq!(engine.record().unwrap(), TimerRecord::default());
    }
}
