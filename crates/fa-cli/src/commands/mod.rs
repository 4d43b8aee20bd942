//! CLI command implementations

mod analyze;
mod check_event;
mod config;

pub use analyze::{analyze_command, AnalyzeOptions};
pub use check_event::check_event_command;
pub use config::{config_get, config_init, config_path, config_set, config_show};
