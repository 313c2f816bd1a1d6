//! Core error types for garden-core.
//!
//! This module defines the error hierarchy using thiserror. Most failures in
//! the timer paths are logged and swallowed by their callers; the types here
//! describe what reaches the caller when something cannot be recovered.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for garden-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Shell cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Notification capability errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key-value and cache storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked by another process
    #[error("Database is locked")]
    Locked,

    /// In-process store lock was poisoned
    #[error("Store lock poisoned")]
    Poisoned,

    /// The data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Key is not part of the configuration
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Shell cache errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A precache resource could not be fetched; nothing was stored.
    #[error("Install failed: could not precache {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    /// Network fetch failed.
    #[error("Network request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// Neither network nor cache could satisfy the request.
    #[error("No response available for {0}")]
    Unavailable(String),

    /// Lifecycle method called in the wrong state.
    #[error("Cannot {operation} while {state}")]
    InvalidLifecycle {
        operation: &'static str,
        state: String,
    },

    /// Request URL could not be resolved.
    #[error("Invalid request URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Backing cache storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Notification capability errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The platform has no notification capability.
    #[error("Notifications are not supported on this platform")]
    Unsupported,

    /// Scheduling or cancelling failed.
    #[error("Notification {id} failed: {message}")]
    Failed { id: i32, message: String },

    /// Launching or focusing the app window failed.
    #[error("Failed to open app window at {url}: {message}")]
    Window { url: String, message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StorageError::Locked
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
