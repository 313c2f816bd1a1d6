//! Notification capability and app-window collaborators.
//!
//! Both are optional at runtime. A platform without notifications plugs in
//! [`NoNotifier`] and the timer behaves identically minus the ongoing
//! notification.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Prompt,
}

/// An ongoing "timer in progress" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OngoingNotification {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub ongoing: bool,
}

impl OngoingNotification {
    pub fn new(id: i32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            ongoing: true,
        }
    }
}

pub trait Notifier {
    fn check_permission(&self) -> Result<PermissionStatus, NotifyError>;

    fn request_permission(&self) -> Result<PermissionStatus, NotifyError>;

    fn schedule(&self, notification: &OngoingNotification) -> Result<(), NotifyError>;

    fn cancel(&self, id: i32) -> Result<(), NotifyError>;
}

/// Stand-in for platforms without a notification capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNotifier;

impl Notifier for NoNotifier {
    fn check_permission(&self) -> Result<PermissionStatus, NotifyError> {
        Err(NotifyError::Unsupported)
    }

    fn request_permission(&self) -> Result<PermissionStatus, NotifyError> {
        Err(NotifyError::Unsupported)
    }

    fn schedule(&self, _notification: &OngoingNotification) -> Result<(), NotifyError> {
        Err(NotifyError::Unsupported)
    }

    fn cancel(&self, _id: i32) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryNotifierState {
    permission: PermissionStatus,
    /// Status a prompt resolves to.
    grant_on_request: bool,
    active: BTreeMap<i32, OngoingNotification>,
    requests: usize,
    fail_schedule: bool,
}

/// In-process notifier. Clones share the same state, so a caller can keep a
/// handle and inspect what the engine posted.
#[derive(Debug, Clone)]
pub struct MemoryNotifier {
    state: Arc<Mutex<MemoryNotifierState>>,
}

impl MemoryNotifier {
    pub fn new(permission: PermissionStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryNotifierState {
                permission,
                grant_on_request: true,
                active: BTreeMap::new(),
                requests: 0,
                fail_schedule: false,
            })),
        }
    }

    /// A prompt that the user will answer with `grant`.
    pub fn prompting(grant: bool) -> Self {
        let notifier = Self::new(PermissionStatus::Prompt);
        notifier.with_state(|s| s.grant_on_request = grant);
        notifier
    }

    /// Make every `schedule` call fail.
    pub fn failing_schedule(self) -> Self {
        self.with_state(|s| s.fail_schedule = true);
        self
    }

    pub fn active(&self) -> Vec<OngoingNotification> {
        self.with_state(|s| s.active.values().cloned().collect())
    }

    pub fn is_active(&self, id: i32) -> bool {
        self.with_state(|s| s.active.contains_key(&id))
    }

    pub fn permission_requests(&self) -> usize {
        self.with_state(|s| s.requests)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryNotifierState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

impl Notifier for MemoryNotifier {
    fn check_permission(&self) -> Result<PermissionStatus, NotifyError> {
        Ok(self.with_state(|s| s.permission))
    }

    fn request_permission(&self) -> Result<PermissionStatus, NotifyError> {
        Ok(self.with_state(|s| {
            s.requests += 1;
            if s.permission == PermissionStatus::Prompt {
                s.permission = if s.grant_on_request {
                    PermissionStatus::Granted
                } else {
                    PermissionStatus::Denied
                };
            }
            s.permission
        }))
    }

    fn schedule(&self, notification: &OngoingNotification) -> Result<(), NotifyError> {
        self.with_state(|s| {
            if s.fail_schedule {
                return Err(NotifyError::Failed {
                    id: notification.id,
                    message: "scheduler unavailable".into(),
                });
            }
            s.active.insert(notification.id, notification.clone());
            Ok(())
        })
    }

    fn cancel(&self, id: i32) -> Result<(), NotifyError> {
        self.with_state(|s| {
            s.active.remove(&id);
        });
        Ok(())
    }
}

/// Brings the app to the foreground, opening it when no window exists.
pub trait AppWindow {
    fn focus_or_open(&self, url: &str) -> Result<(), NotifyError>;
}

/// Cancel a notification, logging instead of failing.
pub(crate) fn cancel_quietly(notifier: &dyn Notifier, id: i32) {
    if let Err(e) = notifier.cancel(id) {
        tracing::warn!(id, error = %e, "failed to cancel timer notification");
    }
}
