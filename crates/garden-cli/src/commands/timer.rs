use std::time::Duration;

use clap::Subcommand;
use garden_core::storage::KeyValueStore;
use garden_core::{Config, Database, Ledger, SystemClock, TimerEngine};

use super::{print_json, CliResult};
use crate::platform::ConsoleNotifier;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume the timer
    Start,
    /// Pause the timer, keeping the accumulated time
    Pause,
    /// Stop the timer and record its hours
    Finish,
    /// Discard the current session
    Reset,
    /// Print current timer state as JSON
    Status,
    /// Print a snapshot every second while the timer runs
    Watch {
        /// Stop after this many snapshots
        #[arg(long)]
        ticks: Option<u64>,
    },
}

pub fn run(action: TimerAction) -> CliResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let notifier = ConsoleNotifier::open(&config)?;
    let mut engine =
        TimerEngine::from_config(&db, &config, Box::new(SystemClock), Box::new(notifier));

    let event = match action {
        TimerAction::Start => engine.start()?,
        TimerAction::Pause => engine.pause()?,
        TimerAction::Finish => {
            let ledger = Ledger::new(&db, &config.storage.app_state_key);
            engine.finish(&ledger)?
        }
        TimerAction::Reset => engine.reset()?,
        TimerAction::Status => None,
        TimerAction::Watch { ticks } => return watch(&engine, ticks),
    };

    // No transition happened; report where the timer stands instead.
    match event {
        Some(event) => print_json(&event),
        None => print_json(&engine.snapshot()?),
    }
}

fn watch<S: KeyValueStore>(engine: &TimerEngine<S>, ticks: Option<u64>) -> CliResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    runtime.block_on(async {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut emitted = 0u64;
        loop {
            interval.tick().await;
            match engine.tick()? {
                Some(event) => print_json(&event)?,
                None => {
                    // Stopped elsewhere, e.g. from the notification.
                    print_json(&engine.snapshot()?)?;
                    break;
                }
            }
            emitted += 1;
            if ticks.is_some_and(|limit| emitted >= limit) {
                break;
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
