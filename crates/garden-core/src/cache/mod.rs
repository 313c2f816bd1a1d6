//! Offline shell cache.
//!
//! One versioned generation of the app shell is kept per registry. The
//! controller precaches it atomically on install, evicts older generations
//! on activate, and answers requests network-first for navigations and
//! cache-first for static assets.

mod controller;
mod fetcher;
mod request;
mod storage;

pub use controller::{CacheController, CacheStatus, FetchOutcome, ResponseSource, WorkerState};
pub use fetcher::{Fetcher, HttpFetcher};
pub use request::{Request, RequestClass, RequestMode, Response};
pub use storage::{CacheStorage, MemoryCacheStorage};
