use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod platform;

#[derive(Parser)]
#[command(name = "garden-cli", version, about = "Garden service-hours CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Service timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Deliver notification taps to the background handler
    Notification {
        #[command(subcommand)]
        action: commands::notification::NotificationCommand,
    },
    /// Offline shell cache
    Cache {
        #[command(subcommand)]
        action: commands::cache::CacheAction,
    },
    /// Recorded service hours
    Hours {
        #[command(subcommand)]
        action: commands::hours::HoursAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GARDEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Notification { action } => commands::notification::run(action),
        Commands::Cache { action } => commands::cache::run(action),
        Commands::Hours { action } => commands::hours::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
