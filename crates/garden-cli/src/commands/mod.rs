pub mod cache;
pub mod config;
pub mod hours;
pub mod notification;
pub mod timer;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
