//! Terminal stand-ins for the notification and window capabilities.

use garden_core::notify::OngoingNotification;
use garden_core::storage::{Database, KeyValueStore};
use garden_core::{AppWindow, Config, NotifyError, Notifier, PermissionStatus};
use url::Url;

const ACTIVE_NOTIFICATION_KEY: &str = "cli_active_notification";

/// Keeps the ongoing notification in the kv table so the process that
/// pauses or finishes the timer can cancel what an earlier one posted.
pub struct ConsoleNotifier {
    db: Database,
    enabled: bool,
}

impl ConsoleNotifier {
    pub fn open(config: &Config) -> Result<Self, garden_core::StorageError> {
        Ok(Self {
            db: Database::open()?,
            enabled: config.notifications.enabled,
        })
    }

    /// The notification currently shown, if any.
    pub fn active(&self) -> Option<OngoingNotification> {
        let raw = self.db.get(ACTIVE_NOTIFICATION_KEY).ok()??;
        serde_json::from_str(&raw).ok()
    }

    fn failed(id: i32, e: impl std::fmt::Display) -> NotifyError {
        NotifyError::Failed {
            id,
            message: e.to_string(),
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn check_permission(&self) -> Result<PermissionStatus, NotifyError> {
        Ok(if self.enabled {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        })
    }

    fn request_permission(&self) -> Result<PermissionStatus, NotifyError> {
        self.check_permission()
    }

    fn schedule(&self, notification: &OngoingNotification) -> Result<(), NotifyError> {
        let raw =
            serde_json::to_string(notification).map_err(|e| Self::failed(notification.id, e))?;
        self.db
            .set(ACTIVE_NOTIFICATION_KEY, &raw)
            .map_err(|e| Self::failed(notification.id, e))?;
        tracing::info!(id = notification.id, title = %notification.title, "notification posted");
        Ok(())
    }

    fn cancel(&self, id: i32) -> Result<(), NotifyError> {
        if self.active().is_some_and(|n| n.id == id) {
            self.db
                .remove(ACTIVE_NOTIFICATION_KEY)
                .map_err(|e| Self::failed(id, e))?;
            tracing::info!(id, "notification cancelled");
        }
        Ok(())
    }
}

/// Opens the app in the system browser when `app.open_browser` is set.
pub struct BrowserWindow {
    origin: String,
    open_browser: bool,
}

impl BrowserWindow {
    pub fn from_config(config: &Config) -> Self {
        Self {
            origin: config.app.origin.clone(),
            open_browser: config.app.open_browser,
        }
    }
}

impl AppWindow for BrowserWindow {
    fn focus_or_open(&self, url: &str) -> Result<(), NotifyError> {
        let window_error = |message: String| NotifyError::Window {
            url: url.to_string(),
            message,
        };
        let target = Url::parse(&self.origin)
            .and_then(|origin| origin.join(url))
            .map_err(|e| window_error(e.to_string()))?;

        if !self.open_browser {
            tracing::info!(url = %target, "app open requested; browser launch disabled");
            return Ok(());
        }
        open::that(target.as_str()).map_err(|e| window_error(e.to_string()))
    }
}
