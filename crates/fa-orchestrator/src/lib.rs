//! fa-orchestrator: Staged face-analysis session client
//!
//! Submits a photo to the analysis backend, follows the resulting session
//! over the message broker and rebuilds its progress purely from the
//! messages it receives. The orchestrator owns at most one session at a
//! time and hands read-only snapshots to the presentation layer.

pub mod backend;
pub mod channel;
pub mod orchestrator;
pub mod presentation;
pub mod session;
pub mod state;
pub mod transport;

pub use backend::HttpJobBackend;
pub use channel::{ChannelClient, ChannelHandler, Connection, ConnectionStatus};
pub use orchestrator::Orchestrator;
pub use presentation::{render, StatusView};
pub use session::{CompositeResult, StageState, StageTracker};
pub use state::{AnalysisSnapshot, FlowError, FlowState};
pub use transport::{MemoryBroker, MqttTransport};
