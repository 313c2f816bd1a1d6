mod config;
pub mod database;
mod memory;

pub use config::{AppConfig, CacheConfig, Config, NotificationsConfig, StorageKeys};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::StorageError;

/// A single write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvWrite {
    Set { key: String, value: String },
    Remove { key: String },
}

impl KvWrite {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        KvWrite::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        KvWrite::Remove { key: key.into() }
    }
}

/// Read access handed to the closure of [`KeyValueStore::update`].
pub trait KvRead {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
}

impl<S: KeyValueStore + ?Sized> KvRead for S {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.get(key)
    }
}

/// Durable string-keyed storage shared by the foreground and background
/// contexts.
///
/// Any transition that depends on what is stored must go through
/// [`KeyValueStore::update`], so the other context cannot write between the
/// read and the write.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.apply(&[KvWrite::set(key, value)])
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.apply(&[KvWrite::remove(key)])
    }

    /// Apply every write or none of them.
    fn apply(&self, batch: &[KvWrite]) -> Result<(), StorageError>;

    /// Read-modify-write as one unit. `f` reads the current values and
    /// returns a result plus the writes to commit. When `f` fails nothing
    /// is written.
    fn update<T, E>(
        &self,
        f: impl FnOnce(&dyn KvRead) -> Result<(T, Vec<KvWrite>), E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>;
}

impl<S: KeyValueStore> KeyValueStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn apply(&self, batch: &[KvWrite]) -> Result<(), StorageError> {
        (**self).apply(batch)
    }

    fn update<T, E>(
        &self,
        f: impl FnOnce(&dyn KvRead) -> Result<(T, Vec<KvWrite>), E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        (**self).update(f)
    }
}

/// Returns the data directory.
///
/// `GARDEN_DATA_DIR` wins when set. Otherwise `~/.config/garden`, or
/// `~/.config/garden-dev` when `GARDEN_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var_os("GARDEN_DATA_DIR") {
        Some(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("GARDEN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("garden-dev")
            } else {
                base_dir.join("garden")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| StorageError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
