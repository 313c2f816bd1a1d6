//! TOML-based application configuration.
//!
//! Stores:
//! - App origin and browser behaviour
//! - Shell cache version, registry and precache list
//! - Notification ids, tags and text
//! - Storage key names shared with the web app
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// App window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin every relative URL resolves against.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Open the app in a browser on notification taps.
    #[serde(default)]
    pub open_browser: bool,
}

/// Shell cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Current generation name. Bumping it invalidates the old shell.
    #[serde(default = "default_cache_version")]
    pub version: String,
    /// Registry the generations belong to; other registries are never evicted.
    #[serde(default = "default_cache_registry")]
    pub registry: String,
    /// Root shell page served when a navigation has nothing cached.
    #[serde(default = "default_shell_url")]
    pub shell_url: String,
    /// Resources fetched atomically on install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timer_id")]
    pub timer_id: i32,
    #[serde(default = "default_timer_tag")]
    pub timer_tag: String,
    #[serde(default = "default_reminder_tag")]
    pub reminder_tag: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
}

/// Storage key names. These match the keys the web app writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageKeys {
    #[serde(default = "default_app_state_key")]
    pub app_state_key: String,
    #[serde(default = "default_start_key")]
    pub start_key: String,
    #[serde(default = "default_base_key")]
    pub base_key: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub storage: StorageKeys,
}

// Default functions
fn default_origin() -> String {
    "http://localhost:5173".into()
}
fn default_cache_version() -> String {
    "garden-cache-v4".into()
}
fn default_cache_registry() -> String {
    "garden-shell".into()
}
fn default_shell_url() -> String {
    "/index.html".into()
}
fn default_precache() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/manifest.json",
        "/assets/icon-192x192.svg",
        "/assets/icon-512x512.svg",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_true() -> bool {
    true
}
fn default_timer_id() -> i32 {
    1
}
fn default_timer_tag() -> String {
    "garden-timer".into()
}
fn default_reminder_tag() -> String {
    "garden-daily-reminder".into()
}
fn default_title() -> String {
    "Temporizador en curso".into()
}
fn default_body() -> String {
    "Tu sesión de servicio está siendo cronometrada.".into()
}
fn default_app_state_key() -> String {
    "garden-service-tracker".into()
}
fn default_start_key() -> String {
    "timer_startTime".into()
}
fn default_base_key() -> String {
    "timer_baseTime".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            open_browser: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: default_cache_version(),
            registry: default_cache_registry(),
            shell_url: default_shell_url(),
            precache: default_precache(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timer_id: default_timer_id(),
            timer_tag: default_timer_tag(),
            reminder_tag: default_reminder_tag(),
            title: default_title(),
            body: default_body(),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            app_state_key: default_app_state_key(),
            start_key: default_start_key(),
            base_key: default_base_key(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    let n = value
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?;
                    serde_json::Value::Number(n.into())
                }
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Returns error if key is unknown
    /// or the value does not fit the existing type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
