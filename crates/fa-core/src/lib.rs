//! fa-core: Core abstractions and configuration for the face-analysis client
//!
//! This crate provides the shared error taxonomy, configuration structures,
//! and the transport/backend traits the orchestrator is written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, ConnectionError, SubmissionError};
pub use types::{CapturedImage, EventAccess, Generation};
