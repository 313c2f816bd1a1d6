mod engine;
mod record;

pub use engine::TimerEngine;
pub use record::{format_hms, TimerRecord, TimerStatus, DISCARD_THRESHOLD_HOURS};
