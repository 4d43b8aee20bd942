//! fa-cli: Command-line interface for the face-analysis client
//!
//! Provides the `face-analysis` binary for submitting photos, checking
//! events and managing configuration.

pub mod commands;
pub mod output;
