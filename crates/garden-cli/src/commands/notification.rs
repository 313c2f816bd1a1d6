use clap::Subcommand;
use garden_core::{BackgroundActionHandler, Config, Database, NotificationClick, SystemClock};

use super::{print_json, CliResult};
use crate::platform::{BrowserWindow, ConsoleNotifier};

#[derive(Subcommand)]
pub enum NotificationCommand {
    /// Simulate a tap on a notification or one of its action buttons
    Click {
        /// Notification tag (e.g. "garden-timer")
        #[arg(long)]
        tag: String,
        /// Action button id: "pause" or "finish". Omit for a body tap.
        #[arg(long, default_value = "")]
        action: String,
    },
    /// Print the notification currently shown, if any
    Active,
}

pub fn run(command: NotificationCommand) -> CliResult {
    let config = Config::load()?;
    let notifier = ConsoleNotifier::open(&config)?;

    match command {
        NotificationCommand::Click { tag, action } => {
            let db = Database::open()?;
            let handler = BackgroundActionHandler::from_config(
                &db,
                &config,
                Box::new(SystemClock),
                Box::new(notifier),
                Box::new(BrowserWindow::from_config(&config)),
            );
            let click = NotificationClick { tag, action };
            match handler.handle_click(&click)? {
                Some(event) => print_json(&event)?,
                None => print_json(&serde_json::json!({
                    "type": "Ignored",
                    "tag": click.tag,
                    "action": click.action,
                }))?,
            }
        }
        NotificationCommand::Active => print_json(&notifier.active())?,
    }
    Ok(())
}
