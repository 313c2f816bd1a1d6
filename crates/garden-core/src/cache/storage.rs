use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::request::Response;
use crate::error::StorageError;

/// Named cache generations grouped by registry.
///
/// Eviction only ever looks inside one registry, so caches owned by
/// something else in the same storage are never collected as garbage.
pub trait CacheStorage {
    /// Generation names registered under `registry`.
    fn generations(&self, registry: &str) -> Result<Vec<String>, StorageError>;

    /// Drop a generation and all its entries. Returns whether it existed.
    fn delete_generation(&self, name: &str) -> Result<bool, StorageError>;

    fn lookup(&self, generation: &str, key: &str) -> Result<Option<Response>, StorageError>;

    /// The generation last activated in `registry`, if any. Installing a
    /// generation does not make it active.
    fn active_generation(&self, registry: &str) -> Result<Option<String>, StorageError>;

    /// Record `generation` as the active one in its registry. Fails when the
    /// generation is not stored under `registry`.
    fn mark_active(&self, registry: &str, generation: &str) -> Result<(), StorageError>;

    /// Store one entry, registering the generation if needed.
    fn put(
        &self,
        registry: &str,
        generation: &str,
        key: &str,
        response: &Response,
    ) -> Result<(), StorageError>;

    /// Store every entry or none.
    fn put_all(
        &self,
        registry: &str,
        generation: &str,
        entries: &[(String, Response)],
    ) -> Result<(), StorageError>;

    fn entry_count(&self, generation: &str) -> Result<usize, StorageError>;
}

impl<C: CacheStorage + ?Sized> CacheStorage for &C {
    fn generations(&self, registry: &str) -> Result<Vec<String>, StorageError> {
        (**self).generations(registry)
    }

    fn delete_generation(&self, name: &str) -> Result<bool, StorageError> {
        (**self).delete_generation(name)
    }

    fn lookup(&self, generation: &str, key: &str) -> Result<Option<Response>, StorageError> {
        (**self).lookup(generation, key)
    }

    fn active_generation(&self, registry: &str) -> Result<Option<String>, StorageError> {
        (**self).active_generation(registry)
    }

    fn mark_active(&self, registry: &str, generation: &str) -> Result<(), StorageError> {
        (**self).mark_active(registry, generation)
    }

    fn put(
        &self,
        registry: &str,
        generation: &str,
        key: &str,
        response: &Response,
    ) -> Result<(), StorageError> {
        (**self).put(registry, generation, key, response)
    }

    fn put_all(
        &self,
        registry: &str,
        generation: &str,
        entries: &[(String, Response)],
    ) -> Result<(), StorageError> {
        (**self).put_all(registry, generation, entries)
    }

    fn entry_count(&self, generation: &str) -> Result<usize, StorageError> {
        (**self).entry_count(generation)
    }
}

#[derive(Debug, Default)]
struct Generation {
    registry: String,
    active: bool,
    entries: HashMap<String, Response>,
}

/// In-process cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    generations: Mutex<BTreeMap<String, Generation>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Generation>) -> T,
    ) -> Result<T, StorageError> {
        let mut generations = self.generations.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&mut generations))
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn generations(&self, registry: &str) -> Result<Vec<String>, StorageError> {
        self.with(|g| {
            g.iter()
                .filter(|(_, slot)| slot.registry == registry)
                .map(|(name, _)| name.clone())
                .collect()
        })
    }

    fn delete_generation(&self, name: &str) -> Result<bool, StorageError> {
        self.with(|g| g.remove(name).is_some())
    }

    fn lookup(&self, generation: &str, key: &str) -> Result<Option<Response>, StorageError> {
        self.with(|g| g.get(generation).and_then(|slot| slot.entries.get(key).cloned()))
    }

    fn active_generation(&self, registry: &str) -> Result<Option<String>, StorageError> {
        self.with(|g| {
            g.iter()
                .find(|(_, slot)| slot.registry == registry && slot.active)
                .map(|(name, _)| name.clone())
        })
    }

    fn mark_active(&self, registry: &str, generation: &str) -> Result<(), StorageError> {
        self.with(|g| {
            let known = g
                .get(generation)
                .is_some_and(|slot| slot.registry == registry);
            if !known {
                return Err(StorageError::QueryFailed(format!(
                    "no generation {generation} in registry {registry}"
                )));
            }
            for (name, slot) in g.iter_mut().filter(|(_, slot)| slot.registry == registry) {
                slot.active = name == generation;
            }
            Ok(())
        })?
    }

    fn put(
        &self,
        registry: &str,
        generation: &str,
        key: &str,
        response: &Response,
    ) -> Result<(), StorageError> {
        self.put_all(registry, generation, &[(key.to_string(), response.clone())])
    }

    fn put_all(
        &self,
        registry: &str,
        generation: &str,
        entries: &[(String, Response)],
    ) -> Result<(), StorageError> {
        self.with(|g| {
            let slot = g.entry(generation.to_string()).or_insert_with(|| Generation {
                registry: registry.to_string(),
                active: false,
                entries: HashMap::new(),
            });
            for (key, response) in entries {
                slot.entries.insert(key.clone(), response.clone());
            }
        })
    }

    fn entry_count(&self, generation: &str) -> Result<usize, StorageError> {
        self.with(|g| g.get(generation).map(|slot| slot.entries.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_do_not_mix() {
        let storage = MemoryCacheStorage::new();
        let ok = Response::new(200, b"x".to_vec());
        storage.put("garden-shell", "garden-cache-v4", "k", &ok).unwrap();
        storage.put("avatars", "avatars-1", "k", &ok).unwrap();
        assert_eq!(storage.generations("garden-shell").unwrap(), vec!["garden-cache-v4"]);
        assert_eq!(storage.generations("avatars").unwrap(), vec!["avatars-1"]);
        assert!(storage.delete_generation("garden-cache-v4").unwrap());
        assert!(!storage.delete_generation("garden-cache-v4").unwrap());
        assert!(storage.lookup("garden-cache-v4", "k").unwrap().is_none());
        assert_eq!(storage.entry_count("avatars-1").unwrap(), 1);
    }

    #[test]
    fn activation_is_exclusive_within_a_registry() {
        let storage = MemoryCacheStorage::new();
        let ok = Response::new(200, b"x".to_vec());
        storage.put("garden-shell", "garden-cache-v3", "k", &ok).unwrap();
        storage.put("garden-shell", "garden-cache-v4", "k", &ok).unwrap();
        storage.put("avatars", "avatars-1", "k", &ok).unwrap();
        assert_eq!(storage.active_generation("garden-shell").unwrap(), None);

        storage.mark_active("avatars", "avatars-1").unwrap();
        storage.mark_active("garden-shell", "garden-cache-v3").unwrap();
        storage.mark_active("garden-shell", "garden-cache-v4").unwrap();
        assert_eq!(
            storage.active_generation("garden-shell").unwrap().as_deref(),
            Some("garden-cache-v4")
        );
        assert_eq!(storage.active_generation("avatars").unwrap().as_deref(), Some("avatars-1"));
        assert!(storage.mark_active("garden-shell", "avatars-1").is_err());
        assert!(storage.mark_active("garden-shell", "garden-cache-v9").is_err());
    }
}
