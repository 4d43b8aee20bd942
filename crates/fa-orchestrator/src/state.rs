//! Orchestrator state as seen by the presentation layer

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use fa_core::{ConnectionError, Generation, SubmissionError};
use fa_protocol::{SessionId, StageName};

use crate::session::{CompositeResult, StageState, StageTracker};

/// Lifecycle of one analysis attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Nothing submitted
    #[default]
    Idle,
    /// Waiting for the backend to hand out a session id
    Submitting,
    /// Session id known, channel being opened
    Awaiting,
    /// Receiving stage messages
    InProgress,
    /// All stages completed
    Done,
    /// The attempt failed; only a retake recovers
    Failed,
}

impl FlowState {
    /// Whether a new submission may start from here
    pub fn accepts_submit(&self) -> bool {
        matches!(self, FlowState::Idle | FlowState::Done | FlowState::Failed)
    }

    /// Whether stage messages are being accepted
    pub fn is_live(&self) -> bool {
        matches!(self, FlowState::Awaiting | FlowState::InProgress)
    }

    /// Done or Failed
    pub fn is_settled(&self) -> bool {
        matches!(self, FlowState::Done | FlowState::Failed)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Idle => "idle",
            FlowState::Submitting => "submitting",
            FlowState::Awaiting => "awaiting",
            FlowState::InProgress => "in progress",
            FlowState::Done => "done",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// User-visible error; every variant is resolved by a retake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The backend refused or could not be reached when starting the job
    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    /// The broker connection failed after the job started
    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    /// The pipeline reported a job-level error
    #[error("Analysis failed: {0}")]
    Job(String),

    /// One or more stages failed
    #[error("{}", describe_failures(.failures))]
    Stage {
        /// Failed stages with their detail
        failures: Vec<(StageName, String)>,
    },

    /// The session did not settle in time
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),
}

fn describe_failures(failures: &[(StageName, String)]) -> String {
    let parts: Vec<String> = failures
        .iter()
        .map(|(stage, detail)| format!("{}: {}", stage, detail))
        .collect();
    format!("Stage failed ({})", parts.join("; "))
}

impl FlowError {
    /// Short category name
    pub fn kind(&self) -> &'static str {
        match self {
            FlowError::Submission(_) => "submission",
            FlowError::Connection(_) => "connection",
            FlowError::Job(_) => "job",
            FlowError::Stage { .. } => "stage",
            FlowError::Timeout(_) => "timeout",
        }
    }

    /// Guidance shown next to the error
    pub fn hint(&self) -> &'static str {
        match self {
            FlowError::Connection(e) => e.hint(),
            FlowError::Submission(SubmissionError::Network(_)) => {
                "Could not reach the analysis service, check the network and retake"
            }
            _ => "Retake the photo to try again",
        }
    }
}

impl Serialize for FlowError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("FlowError", 3)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.serialize_field("hint", self.hint())?;
        s.end()
    }
}

/// Read-only view of the orchestrator, published on every change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    /// Generation of the current attempt
    pub generation: Generation,
    /// Flow state
    pub flow: FlowState,
    /// Session id once the backend handed one out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Per-stage state; all pending without a session
    pub stages: BTreeMap<StageName, StageState>,
    /// Composite result once done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeResult>,
    /// Current error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
    /// Whether a captured image is still held
    pub has_image: bool,
}

impl AnalysisSnapshot {
    /// The baseline before any submission
    pub fn idle(generation: Generation) -> Self {
        Self {
            generation,
            flow: FlowState::Idle,
            session_id: None,
            stages: pending_stages(),
            composite: None,
            error: None,
            has_image: false,
        }
    }

    /// Whether this is the idle baseline, ignoring the generation
    pub fn is_idle_baseline(&self) -> bool {
        self.flow == FlowState::Idle
            && self.session_id.is_none()
            && self.composite.is_none()
            && self.error.is_none()
            && !self.has_image
            && self.stages == pending_stages()
    }

    /// State of one stage
    pub fn stage(&self, stage: StageName) -> StageState {
        self.stages.get(&stage).cloned().unwrap_or_default()
    }

    pub(crate) fn stages_of(tracker: Option<&StageTracker>) -> BTreeMap<StageName, StageState> {
        match tracker {
            Some(tracker) => tracker
                .stages()
                .map(|(stage, state)| (stage, state.clone()))
                .collect(),
            None => pending_stages(),
        }
    }
}

fn pending_stages() -> BTreeMap<StageName, StageState> {
    StageName::ALL
        .into_iter()
        .map(|stage| (stage, StageState::default()))
        .collect()
}
