//! Core trait definitions

mod backend;
mod transport;

pub use backend::{JobBackend, JobContext};
pub use transport::{Transport, TransportEvent, TransportLink, TransportSession};
