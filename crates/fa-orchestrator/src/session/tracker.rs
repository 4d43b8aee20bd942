//! Per-session stage tracker
//!
//! The tracker is the only record of a session's progress: there is no
//! server-side session object to query, so everything here is rebuilt from
//! the messages the broker delivers.
//!
//! # Transition rules
//!
//! - A stage moves between `Pending` and `Processing` freely while it is
//!   non-terminal, including same-state no-ops.
//! - A result moves a stage to `Completed`; an error moves it to `Failed`.
//!   Both are terminal: anything later for that stage is ignored, which
//!   makes duplicate (at-least-once) delivery harmless.
//! - A failed stage never touches its siblings.
//! - An error without a stage is recorded as a session-level error and
//!   marks no stage.
//! - Unknown stage or status identifiers are dropped with a warning.
//!
//! [`StageTracker::is_complete`] is the authoritative completion signal.
//! The broker's `completed` message only prompts a re-check, since it can
//! overtake individual stage results.

use serde::Serialize;
use serde_json::Value;

use fa_protocol::{ErrorPayload, InboundMessage, SessionId, StageName, StageStatus, StatusPayload};

/// State of one stage.
///
/// `result` is present iff the stage is `Completed`, and `error_detail` iff
/// it is `Failed`. Fields are private so only the tracker can uphold that.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
}

impl StageState {
    /// Current status
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Result document, present once completed
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Summary sent with the result, if any
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Failure detail, present once failed
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Whether the stage accepts no further transitions
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// All three stage results, derived once every stage has completed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResult {
    /// Face shape result
    pub face_shape: Value,
    /// Facial features result
    pub features: Value,
    /// Overall result
    pub overall: Value,
    /// Summary carried by the overall stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// What applying a message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Some state changed
    Changed,
    /// Valid input that changed nothing (duplicate, terminal stage, same status)
    Unchanged,
    /// Input was unusable and was dropped
    Dropped,
    /// The broker's completion hint; completion should be re-checked
    CompletionHint,
}

/// Tracks stage state for one session
#[derive(Debug, Clone)]
pub struct StageTracker {
    session_id: SessionId,
    stages: [StageState; 3],
    session_error: Option<String>,
}

impl StageTracker {
    /// Create a tracker with every stage pending
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            stages: Default::default(),
            session_error: None,
        }
    }

    /// Session this tracker belongs to
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// State of one stage
    pub fn stage(&self, stage: StageName) -> &StageState {
        &self.stages[stage.index()]
    }

    /// All stages in display order
    pub fn stages(&self) -> impl Iterator<Item = (StageName, &StageState)> {
        StageName::ALL.into_iter().zip(self.stages.iter())
    }

    /// Job-level error, if one was reported
    pub fn session_error(&self) -> Option<&str> {
        self.session_error.as_deref()
    }

    /// Apply a status update. Terminal statuses are not accepted here: a
    /// completion must come with its result, and a reported failure is
    /// routed through [`StageTracker::apply_error`].
    pub fn apply_status(&mut self, stage: StageName, status: StageStatus) -> bool {
        match status {
            StageStatus::Failed => self.apply_error(Some(stage), format!("{} stage failed", stage)),
            StageStatus::Completed => {
                tracing::debug!(
                    session_id = %self.session_id,
                    stage = %stage,
                    "Status reports completion; waiting for the result message"
                );
                false
            }
            StageStatus::Pending | StageStatus::Processing => {
                let state = &mut self.stages[stage.index()];
                if state.is_terminal() || state.status == status {
                    return false;
                }
                tracing::debug!(
                    session_id = %self.session_id,
                    stage = %stage,
                    from = %state.status,
                    to = %status,
                    "Stage status changed"
                );
                state.status = status;
                true
            }
        }
    }

    /// Complete a stage with its result; ignored once the stage is terminal
    pub fn apply_result(&mut self, stage: StageName, result: Value, summary: Option<String>) -> bool {
        let state = &mut self.stages[stage.index()];
        if state.is_terminal() {
            tracing::debug!(
                session_id = %self.session_id,
                stage = %stage,
                status = %state.status,
                "Ignoring result for terminal stage"
            );
            return false;
        }

        *state = StageState {
            status: StageStatus::Completed,
            result: Some(result),
            summary,
            error_detail: None,
        };
        tracing::info!(session_id = %self.session_id, stage = %stage, "Stage completed");
        true
    }

    /// Record an error. With a stage, that stage fails (unless already
    /// terminal); without one, a session-level error is raised.
    pub fn apply_error(&mut self, stage: Option<StageName>, message: impl Into<String>) -> bool {
        let message = message.into();
        match stage {
            Some(stage) => {
                let state = &mut self.stages[stage.index()];
                if state.is_terminal() {
                    tracing::debug!(
                        session_id = %self.session_id,
                        stage = %stage,
                        "Ignoring error for terminal stage"
                    );
                    return false;
                }
                tracing::warn!(
                    session_id = %self.session_id,
                    stage = %stage,
                    error = %message,
                    "Stage failed"
                );
                *state = StageState {
                    status: StageStatus::Failed,
                    result: None,
                    summary: None,
                    error_detail: Some(message),
                };
                true
            }
            None => {
                if self.session_error.as_deref() == Some(message.as_str()) {
                    return false;
                }
                tracing::warn!(session_id = %self.session_id, error = %message, "Session error");
                self.session_error = Some(message);
                true
            }
        }
    }

    /// Apply a decoded broker message
    pub fn apply(&mut self, message: InboundMessage) -> Applied {
        let changed = match message {
            InboundMessage::Status(StatusPayload { stage, status }) => {
                let Some(stage) = self.known_stage(&stage) else {
                    return Applied::Dropped;
                };
                match status.parse::<StageStatus>() {
                    Ok(status) => self.apply_status(stage, status),
                    Err(e) => {
                        tracing::warn!(session_id = %self.session_id, error = %e, "Dropping status update");
                        return Applied::Dropped;
                    }
                }
            }
            InboundMessage::StageResult { stage, payload } => {
                self.apply_result(stage, payload.result, payload.summary)
            }
            InboundMessage::Error(payload) => {
                let message = payload.message();
                let ErrorPayload { stage, .. } = payload;
                match stage {
                    Some(raw) => {
                        let Some(stage) = self.known_stage(&raw) else {
                            return Applied::Dropped;
                        };
                        self.apply_error(Some(stage), message)
                    }
                    None => self.apply_error(None, message),
                }
            }
            InboundMessage::Completed(_) => return Applied::CompletionHint,
        };

        if changed {
            Applied::Changed
        } else {
            Applied::Unchanged
        }
    }

    /// True iff every stage has completed
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(|s| s.status == StageStatus::Completed)
    }

    /// True iff every stage is terminal; nothing further can change
    pub fn is_settled(&self) -> bool {
        self.stages.iter().all(StageState::is_terminal)
    }

    /// Failed stages with their detail
    pub fn failures(&self) -> Vec<(StageName, String)> {
        self.stages()
            .filter_map(|(stage, state)| state.error_detail().map(|d| (stage, d.to_string())))
            .collect()
    }

    /// The composite result, once complete
    pub fn composite(&self) -> Option<CompositeResult> {
        if !self.is_complete() {
            return None;
        }
        let result = |stage: StageName| self.stage(stage).result().cloned();

        Some(CompositeResult {
            face_shape: result(StageName::FaceShape)?,
            features: result(StageName::Features)?,
            overall: result(StageName::Overall)?,
            summary: self.stage(StageName::Overall).summary().map(str::to_string),
        })
    }

    fn known_stage(&self, raw: &str) -> Option<StageName> {
        match raw.parse() {
            Ok(stage) => Some(stage),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Dropping message for unknown stage");
                None
            }
        }
    }
}
