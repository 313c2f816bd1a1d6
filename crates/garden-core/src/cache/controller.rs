//! Service-worker style cache controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Installing -> Waiting -> Active(version) -> [new version] Installing -> ...
//!           \-> Redundant (install failed, nothing stored)
//! ```
//!
//! Activation is persisted with the generation, so a later process sees an
//! installed but never activated generation as Waiting. Until the new
//! version activates, the previously activated generation keeps serving.
//!
//! ## Fetch policy
//!
//! | class       | strategy      | on network failure                          |
//! |-------------|---------------|---------------------------------------------|
//! | navigation  | network-first | cached document, then cached shell page     |
//! | non-GET     | not handled   | -                                           |
//! | static asset| cache-first   | error, no synthetic response                |

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use super::fetcher::Fetcher;
use super::request::{Request, RequestClass, Response};
use super::storage::CacheStorage;
use crate::error::CacheError;
use crate::events::Event;
use crate::storage::{CacheConfig, Config};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// The root shell page stood in for an uncached navigation.
    ShellFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the request goes straight to the network.
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub state: WorkerState,
    pub version: String,
    pub registry: String,
    /// Generation answering fetches, if any.
    pub serving: Option<String>,
    /// Every generation in the registry with its entry count.
    pub generations: Vec<(String, usize)>,
}

pub struct CacheController<C, F> {
    storage: C,
    fetcher: F,
    origin: Url,
    config: CacheConfig,
    state: WorkerState,
    /// Last activated generation in the registry. It may be older than
    /// `config.version` while an upgrade installs or waits.
    serving: Option<String>,
}

impl<C: CacheStorage, F: Fetcher> CacheController<C, F> {
    /// Attach to `storage`, deriving the lifecycle state from what is
    /// already stored: no current generation means a fresh install is due,
    /// a current generation that was never activated is waiting, and an
    /// activated current generation is active.
    pub fn open(
        storage: C,
        fetcher: F,
        origin: &str,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        let origin = Url::parse(origin).map_err(|source| CacheError::InvalidUrl {
            url: origin.to_string(),
            source,
        })?;
        let generations = storage.generations(&config.registry)?;
        let serving = storage.active_generation(&config.registry)?;
        let state = if !generations.contains(&config.version) {
            WorkerState::Installing
        } else if serving.as_deref() == Some(config.version.as_str()) {
            WorkerState::Active
        } else {
            WorkerState::Waiting
        };
        tracing::debug!(
            version = %config.version,
            %state,
            serving = serving.as_deref().unwrap_or("-"),
            "cache controller attached"
        );
        Ok(Self {
            storage,
            fetcher,
            origin,
            config,
            state,
            serving,
        })
    }

    pub fn from_config(storage: C, fetcher: F, config: &Config) -> Result<Self, CacheError> {
        Self::open(storage, fetcher, &config.app.origin, config.cache.clone())
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn serving(&self) -> Option<&str> {
        self.serving.as_deref()
    }

    pub fn status(&self) -> Result<CacheStatus, CacheError> {
        let mut generations = Vec::new();
        for name in self.storage.generations(&self.config.registry)? {
            let count = self.storage.entry_count(&name)?;
            generations.push((name, count));
        }
        Ok(CacheStatus {
            state: self.state,
            version: self.config.version.clone(),
            registry: self.config.registry.clone(),
            serving: self.serving.clone(),
            generations,
        })
    }

    /// Resolve a request URL against the app origin and drop its fragment.
    pub fn resolve(&self, url: &str) -> Result<Url, CacheError> {
        let mut resolved = self.origin.join(url).map_err(|source| CacheError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        resolved.set_fragment(None);
        Ok(resolved)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Precache the shell. Every resource must come back 200 or nothing is
    /// stored and the controller becomes redundant.
    pub async fn install(&mut self) -> Result<Event, CacheError> {
        self.state = WorkerState::Installing;

        let precache = self.config.precache.clone();
        let mut entries = Vec::with_capacity(precache.len());
        for path in &precache {
            let url = match self.resolve(path) {
                Ok(url) => url,
                Err(e) => return Err(self.fail_install(path, e.to_string())),
            };
            match self.fetcher.fetch(&url).await {
                Ok(resp) if resp.is_cacheable() => entries.push((url.to_string(), resp)),
                Ok(resp) => {
                    return Err(self.fail_install(path, format!("HTTP status {}", resp.status)))
                }
                Err(e) => return Err(self.fail_install(path, e.to_string())),
            }
        }

        if let Err(e) = self
            .storage
            .put_all(&self.config.registry, &self.config.version, &entries)
        {
            let version = self.config.version.clone();
            return Err(self.fail_install(&version, e.to_string()));
        }

        self.state = WorkerState::Waiting;
        tracing::info!(version = %self.config.version, entries = entries.len(), "shell precached");
        Ok(Event::CacheInstalled {
            generation: self.config.version.clone(),
            entries: entries.len(),
            at: Utc::now(),
        })
    }

    /// Promote the waiting generation, persist that it is active, and
    /// delete every other generation in this controller's registry.
    pub fn activate(&mut self) -> Result<Event, CacheError> {
        if self.state != WorkerState::Waiting {
            return Err(CacheError::InvalidLifecycle {
                operation: "activate",
                state: self.state.to_string(),
            });
        }

        self.storage
            .mark_active(&self.config.registry, &self.config.version)?;
        self.serving = Some(self.config.version.clone());
        self.state = WorkerState::Active;

        let mut evicted = Vec::new();
        for name in self.storage.generations(&self.config.registry)? {
            if name == self.config.version {
                continue;
            }
            if self.storage.delete_generation(&name)? {
                tracing::info!(generation = %name, "deleted old cache generation");
                evicted.push(name);
            }
        }

        Ok(Event::CacheActivated {
            generation: self.config.version.clone(),
            evicted,
            at: Utc::now(),
        })
    }

    // ── Fetch ────────────────────────────────────────────────────────

    /// Answer a request per the fetch policy from the serving generation.
    /// Nothing is intercepted before a first activation. A new version
    /// that is installing, waiting or failed does not take over until it
    /// activates.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, CacheError> {
        let Some(generation) = self.serving.as_deref() else {
            return Ok(FetchOutcome::Passthrough);
        };
        match request.class() {
            RequestClass::Passthrough => Ok(FetchOutcome::Passthrough),
            RequestClass::Navigation => self.network_first(generation, request).await,
            RequestClass::StaticAsset => self.cache_first(generation, request).await,
        }
    }

    async fn network_first(
        &self,
        generation: &str,
        request: &Request,
    ) -> Result<FetchOutcome, CacheError> {
        let url = self.resolve(&request.url)?;
        let key = url.to_string();

        match self.fetcher.fetch(&url).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store(generation, &key, &response);
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "navigation offline, trying cache");
                if let Some(response) = self.storage.lookup(generation, &key)? {
                    return Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::Cache,
                    });
                }
                let shell = self.resolve(&self.config.shell_url)?.to_string();
                match self.storage.lookup(generation, &shell)? {
                    Some(response) => Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::ShellFallback,
                    }),
                    None => Err(CacheError::Unavailable(key)),
                }
            }
        }
    }

    async fn cache_first(
        &self,
        generation: &str,
        request: &Request,
    ) -> Result<FetchOutcome, CacheError> {
        let url = self.resolve(&request.url)?;
        let key = url.to_string();

        if let Some(response) = self.storage.lookup(generation, &key)? {
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }

        let response = self.fetcher.fetch(&url).await?;
        if response.is_cacheable() {
            self.store(generation, &key, &response);
        }
        Ok(FetchOutcome::Respond {
            response,
            source: ResponseSource::Network,
        })
    }

    /// Write back a network response; a failed write only costs offline
    /// availability, so it is logged.
    fn store(&self, generation: &str, key: &str, response: &Response) {
        if let Err(e) = self
            .storage
            .put(&self.config.registry, generation, key, response)
        {
            tracing::warn!(url = key, error = %e, "failed to cache response");
        }
    }

    fn fail_install(&mut self, url: &str, reason: String) -> CacheError {
        self.state = WorkerState::Redundant;
        tracing::error!(url, %reason, version = %self.config.version, "shell install failed");
        CacheError::InstallFailed {
            url: url.to_string(),
            reason,
        }
    }
}
