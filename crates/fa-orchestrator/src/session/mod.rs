//! Session state tracking

mod tracker;
mod watchdog;

pub use tracker::{Applied, CompositeResult, StageState, StageTracker};
pub use watchdog::Watchdog;
