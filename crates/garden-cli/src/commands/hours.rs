use clap::Subcommand;
use garden_core::{Config, Database, Ledger};

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum HoursAction {
    /// Print the stored application state
    Show {
        /// Only this service year (e.g. "2024-2025")
        #[arg(long)]
        year: Option<String>,
    },
}

pub fn run(action: HoursAction) -> CliResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let ledger = Ledger::new(&db, &config.storage.app_state_key);

    match action {
        HoursAction::Show { year: None } => print_json(&ledger.load()?)?,
        HoursAction::Show { year: Some(year) } => {
            let state = ledger.load()?;
            print_json(&serde_json::json!({
                "serviceYear": year,
                "totalHours": state.year_total(&year),
                "days": state.archives.get(&year).cloned().unwrap_or_default(),
            }))?;
        }
    }
    Ok(())
}
