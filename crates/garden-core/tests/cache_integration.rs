//! Integration tests for the offline shell cache on top of SQLite.

use std::cell::Cell;

use garden_core::cache::{CacheStorage, Fetcher, ResponseSource, WorkerState};
use garden_core::{
    CacheController, CacheError, Config, Database, Event, FetchOutcome, Request, Response,
};
use url::Url;

/// Serves every precache path with a body naming the build; goes dark on
/// demand.
struct StaticSite {
    build: &'static str,
    online: Cell<bool>,
    hits: Cell<usize>,
}

impl StaticSite {
    fn new(build: &'static str) -> Self {
        Self {
            build,
            online: Cell::new(true),
            hits: Cell::new(0),
        }
    }
}

impl Fetcher for &StaticSite {
    async fn fetch(&self, url: &Url) -> Result<Response, CacheError> {
        self.hits.set(self.hits.get() + 1);
        if !self.online.get() {
            return Err(CacheError::Network {
                url: url.to_string(),
                message: "offline".into(),
            });
        }
        let body = format!("{} {}", self.build, url.path());
        Ok(Response::new(200, body.into_bytes()))
    }
}

fn config(version: &str) -> Config {
    let mut config = Config::default();
    config.app.origin = "http://garden.test".to_string();
    config.cache.version = version.to_string();
    config
}

fn body(outcome: FetchOutcome) -> (String, ResponseSource) {
    match outcome {
        FetchOutcome::Respond { response, source } => {
            (String::from_utf8(response.body).unwrap(), source)
        }
        FetchOutcome::Passthrough => panic!("Expected a response, got passthrough"),
    }
}

#[tokio::test]
async fn test_version_upgrade_replaces_shell() {
    let db = Database::open_memory().unwrap();

    let v3 = StaticSite::new("v3");
    let mut ctl = CacheController::from_config(&db, &v3, &config("garden-cache-v3")).unwrap();
    ctl.install().await.unwrap();
    ctl.activate().unwrap();

    let v4 = StaticSite::new("v4");
    let mut ctl = CacheController::from_config(&db, &v4, &config("garden-cache-v4")).unwrap();
    assert_eq!(ctl.state(), WorkerState::Installing);
    ctl.install().await.unwrap();

    // Both generations exist until activation.
    assert_eq!(
        db.generations("garden-shell").unwrap(),
        vec!["garden-cache-v3", "garden-cache-v4"]
    );
    match ctl.activate().unwrap() {
        Event::CacheActivated { evicted, .. } => assert_eq!(evicted, vec!["garden-cache-v3"]),
        other => panic!("Expected CacheActivated, got {other:?}"),
    }
    assert_eq!(db.generations("garden-shell").unwrap(), vec!["garden-cache-v4"]);
    assert_eq!(db.entry_count("garden-cache-v3").unwrap(), 0);

    v4.online.set(false);
    let (text, source) = body(
        ctl.handle_fetch(&Request::get("/assets/icon-192x192.svg"))
            .await
            .unwrap(),
    );
    assert_eq!(text, "v4 /assets/icon-192x192.svg");
    assert_eq!(source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_offline_deep_link_gets_shell() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garden.db");

    {
        let db = Database::open_at(&path).unwrap();
        let site = StaticSite::new("v4");
        let mut ctl =
            CacheController::from_config(&db, &site, &config("garden-cache-v4")).unwrap();
        ctl.install().await.unwrap();
        ctl.activate().unwrap();
    }

    // A later process finds the generation active on disk.
    let db = Database::open_at(&path).unwrap();
    let site = StaticSite::new("v5");
    site.online.set(false);
    let ctl = CacheController::from_config(&db, &site, &config("garden-cache-v4")).unwrap();
    assert_eq!(ctl.state(), WorkerState::Active);

    let (text, source) = body(
        ctl.handle_fetch(&Request::navigate("/history/2024"))
            .await
            .unwrap(),
    );
    assert_eq!(text, "v4 /index.html");
    assert_eq!(source, ResponseSource::ShellFallback);
    assert_eq!(site.hits.get(), 1);
}

#[tokio::test]
async fn test_first_install_activates_from_a_later_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garden.db");
    let site = StaticSite::new("v4");

    {
        let db = Database::open_at(&path).unwrap();
        let mut ctl = CacheController::from_config(&db, &site, &config("garden-cache-v4")).unwrap();
        ctl.install().await.unwrap();
    }

    // Installed but never activated: the next process is waiting, not active.
    {
        let db = Database::open_at(&path).unwrap();
        let mut ctl = CacheController::from_config(&db, &site, &config("garden-cache-v4")).unwrap();
        assert_eq!(ctl.state(), WorkerState::Waiting);
        assert_eq!(
            ctl.handle_fetch(&Request::navigate("/")).await.unwrap(),
            FetchOutcome::Passthrough
        );
        ctl.activate().unwrap();
    }

    let db = Database::open_at(&path).unwrap();
    let ctl = CacheController::from_config(&db, &site, &config("garden-cache-v4")).unwrap();
    assert_eq!(ctl.state(), WorkerState::Active);
    assert_eq!(ctl.serving(), Some("garden-cache-v4"));
}

#[tokio::test]
async fn test_failed_install_keeps_previous_generation_serving() {
    let db = Database::open_memory().unwrap();
    let v3 = StaticSite::new("v3");
    let mut ctl = CacheController::from_config(&db, &v3, &config("garden-cache-v3")).unwrap();
    ctl.install().await.unwrap();
    ctl.activate().unwrap();

    let v4 = StaticSite::new("v4");
    v4.online.set(false);
    let mut next = CacheController::from_config(&db, &v4, &config("garden-cache-v4")).unwrap();
    assert!(matches!(
        next.install().await,
        Err(CacheError::InstallFailed { .. })
    ));
    assert_eq!(next.state(), WorkerState::Redundant);
    assert_eq!(db.generations("garden-shell").unwrap(), vec!["garden-cache-v3"]);
    assert_eq!(db.entry_count("garden-cache-v3").unwrap(), 5);

    // The failed controller still answers from v3.
    let (text, source) = body(
        next.handle_fetch(&Request::get("/manifest.json"))
            .await
            .unwrap(),
    );
    assert_eq!(text, "v3 /manifest.json");
    assert_eq!(source, ResponseSource::Cache);

    // So does a fresh process that has yet to install v4.
    let reopened = CacheController::from_config(&db, &v4, &config("garden-cache-v4")).unwrap();
    assert_eq!(reopened.state(), WorkerState::Installing);
    assert_eq!(reopened.serving(), Some("garden-cache-v3"));
    let (text, source) = body(
        reopened
            .handle_fetch(&Request::navigate("/history"))
            .await
            .unwrap(),
    );
    assert_eq!(text, "v3 /index.html");
    assert_eq!(source, ResponseSource::ShellFallback);
}

#[tokio::test]
async fn test_status_reports_generations() {
    let db = Database::open_memory().unwrap();
    let site = StaticSite::new("v4");
    let mut ctl = CacheController::from_config(&db, &site, &config("garden-cache-v4")).unwrap();
    ctl.install().await.unwrap();
    ctl.activate().unwrap();

    let status = ctl.status().unwrap();
    assert_eq!(status.state, WorkerState::Active);
    assert_eq!(status.registry, "garden-shell");
    assert_eq!(status.serving.as_deref(), Some("garden-cache-v4"));
    assert_eq!(status.generations, vec![("garden-cache-v4".to_string(), 5)]);
}
