use std::collections::HashMap;
use std::sync::Mutex;

use super::{KeyValueStore, KvRead, KvWrite};
use crate::error::StorageError;

/// In-process key-value store. Batches apply under a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn apply(&self, batch: &[KvWrite]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        write_all(&mut entries, batch);
        Ok(())
    }

    fn update<T, E>(
        &self,
        f: impl FnOnce(&dyn KvRead) -> Result<(T, Vec<KvWrite>), E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        let (value, writes) = f(&Snapshot(&entries))?;
        write_all(&mut entries, &writes);
        Ok(value)
    }
}

/// The locked map, as seen from inside `update`.
struct Snapshot<'a>(&'a HashMap<String, String>);

impl KvRead for Snapshot<'_> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.0.get(key).cloned())
    }
}

fn write_all(entries: &mut HashMap<String, String>, batch: &[KvWrite]) {
    for write in batch {
        match write {
            KvWrite::Set { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            KvWrite::Remove { key } => {
                entries.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_applies_in_order() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        store
            .apply(&[
                KvWrite::remove("a"),
                KvWrite::set("b", "2"),
                KvWrite::set("b", "3"),
            ])
            .unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert_eq!(store.get("b").unwrap().as_deref(), Some("3"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_writes_only_on_success() {
        let store = MemoryStore::new();
        store.set("count", "1").unwrap();

        let next = store
            .update(|r| -> Result<_, StorageError> {
                let count: u32 = r.read("count")?.and_then(|v| v.parse().ok()).unwrap_or(0);
                Ok((count + 1, vec![KvWrite::set("count", (count + 1).to_string())]))
            })
            .unwrap();
        assert_eq!(next, 2);
        assert_eq!(store.get("count").unwrap().as_deref(), Some("2"));

        let failed: Result<(), StorageError> =
            store.update(|_| Err(StorageError::QueryFailed("rejected".into())));
        assert!(failed.is_err());
        assert_eq!(store.get("count").unwrap().as_deref(), Some("2"));
    }
}
