//! Notification actions applied while no foreground timer is running.
//!
//! The handler runs in the background context and shares nothing with the
//! [`TimerEngine`](crate::timer::TimerEngine) except durable storage. It
//! uses the same [`TimerRecord`] fold and the same ledger update, so a
//! session finished here lands in the archives exactly as it would from
//! the foreground.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::Event;
use crate::ledger::Ledger;
use crate::notify::{cancel_quietly, AppWindow, Notifier};
use crate::storage::{Config, KeyValueStore, StorageKeys};
use crate::timer::TimerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    Pause,
    Finish,
}

impl FromStr for NotificationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(NotificationAction::Pause),
            "finish" => Ok(NotificationAction::Finish),
            other => Err(format!("unknown notification action: {other}")),
        }
    }
}

/// A tap on a notification or one of its action buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    pub tag: String,
    /// Action button id; empty for a tap on the notification body.
    #[serde(default)]
    pub action: String,
}

pub struct BackgroundActionHandler<S> {
    store: S,
    keys: StorageKeys,
    clock: Box<dyn Clock>,
    notifier: Box<dyn Notifier>,
    window: Box<dyn AppWindow>,
    timer_tag: String,
    reminder_tag: String,
    timer_notification_id: i32,
    app_url: String,
}

impl<S: KeyValueStore> BackgroundActionHandler<S> {
    pub fn from_config(
        store: S,
        config: &Config,
        clock: Box<dyn Clock>,
        notifier: Box<dyn Notifier>,
        window: Box<dyn AppWindow>,
    ) -> Self {
        Self {
            store,
            keys: config.storage.clone(),
            clock,
            notifier,
            window,
            timer_tag: config.notifications.timer_tag.clone(),
            reminder_tag: config.notifications.reminder_tag.clone(),
            timer_notification_id: config.notifications.timer_id,
            app_url: "/".to_string(),
        }
    }

    /// Route a notification tap. Timer actions mutate the stored timer;
    /// everything else brings the app forward.
    pub fn handle_click(&self, click: &NotificationClick) -> Result<Option<Event>, CoreError> {
        if click.tag == self.timer_tag {
            cancel_quietly(self.notifier.as_ref(), self.timer_notification_id);
            if click.action.is_empty() {
                return Ok(self.open_app());
            }
            return match click.action.parse::<NotificationAction>() {
                Ok(action) => self.handle_action(action),
                Err(e) => {
                    tracing::warn!(tag = %click.tag, error = %e, "ignoring notification action");
                    Ok(None)
                }
            };
        }

        if click.tag == self.reminder_tag {
            tracing::info!(tag = %click.tag, "daily reminder tapped");
        } else {
            tracing::debug!(tag = %click.tag, "unrecognised notification tapped");
        }
        Ok(self.open_app())
    }

    /// Apply `action` to the stored timer. A stopped timer means the action
    /// is stale or duplicated, and nothing happens.
    pub fn handle_action(&self, action: NotificationAction) -> Result<Option<Event>, CoreError> {
        let now = self.clock.now();
        let applied = TimerRecord::transition(&self.store, &self.keys, |record| {
            record.is_running().then(|| {
                let folded = record.fold(now);
                let next = match action {
                    NotificationAction::Pause => folded,
                    NotificationAction::Finish => TimerRecord::default(),
                };
                (next, folded.base_secs)
            })
        })?;
        let Some(elapsed_secs) = applied else {
            tracing::debug!(?action, "timer not running, ignoring background action");
            return Ok(None);
        };
        cancel_quietly(self.notifier.as_ref(), self.timer_notification_id);

        match action {
            NotificationAction::Pause => {
                tracing::info!(elapsed_secs, "timer paused from notification");
                Ok(Some(Event::BackgroundPaused {
                    elapsed_secs,
                    at: now,
                }))
            }
            NotificationAction::Finish => {
                // The clear is already committed; a ledger failure below
                // does not bring the timer back.
                let hours = TimerRecord::hours(elapsed_secs);
                let mut logged = false;
                if TimerRecord::worth_logging(hours) {
                    let ledger = Ledger::new(&self.store, &self.keys.app_state_key);
                    match ledger.add(hours, self.clock.today()) {
                        Ok(_) => logged = true,
                        Err(e) => {
                            tracing::error!(
                                hours,
                                error = %e,
                                "failed to update app state from notification"
                            )
                        }
                    }
                }

                Ok(Some(Event::BackgroundFinished {
                    elapsed_secs,
                    hours,
                    logged,
                    at: now,
                }))
            }
        }
    }

    fn open_app(&self) -> Option<Event> {
        match self.window.focus_or_open(&self.app_url) {
            Ok(()) => Some(Event::AppOpened {
                url: self.app_url.clone(),
                at: self.clock.now(),
            }),
            Err(e) => {
                tracing::warn!(url = %self.app_url, error = %e, "could not bring app forward");
                None
            }
        }
    }
}
