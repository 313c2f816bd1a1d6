use chrono::Utc;
use clap::Subcommand;
use garden_core::cache::{CacheController, FetchOutcome, HttpFetcher, Request};
use garden_core::{Config, Database, Event};

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum CacheAction {
    /// Precache the app shell under the configured version
    Install,
    /// Promote the installed version and delete older ones
    Activate,
    /// Print lifecycle state and stored generations
    Status,
    /// Run a request through the fetch policy
    Fetch {
        /// URL, absolute or relative to the app origin
        url: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
    },
}

pub fn run(action: CacheAction) -> CliResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let mut controller = CacheController::from_config(&db, HttpFetcher::new()?, &config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match action {
        CacheAction::Install => {
            let event = runtime.block_on(controller.install())?;
            print_json(&event)?;
        }
        CacheAction::Activate => print_json(&controller.activate()?)?,
        CacheAction::Status => print_json(&controller.status()?)?,
        CacheAction::Fetch {
            url,
            navigate,
            method,
        } => {
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            }
            .with_method(method);

            match runtime.block_on(controller.handle_fetch(&request))? {
                FetchOutcome::Passthrough => print_json(&serde_json::json!({
                    "type": "Passthrough",
                    "url": request.url,
                    "state": controller.state(),
                }))?,
                FetchOutcome::Respond { response, source } => print_json(&Event::Fetched {
                    url: controller.resolve(&request.url)?.to_string(),
                    status: response.status,
                    source,
                    at: Utc::now(),
                })?,
            }
        }
    }
    Ok(())
}
