//! Maps orchestrator state to display text

use serde::Serialize;

use fa_protocol::{StageName, StageStatus};

use crate::state::{AnalysisSnapshot, FlowState};

/// How a stage indicator should be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageVisual {
    /// Not started
    Idle,
    /// Currently running
    Spinning,
    /// Finished successfully
    Done,
    /// Finished with an error
    Error,
}

/// One row of the stage list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageLine {
    /// Stage shown on this row
    pub stage: StageName,
    /// Human-readable stage label
    pub label: &'static str,
    /// Indicator style
    pub visual: StageVisual,
    /// Status text
    pub text: &'static str,
}

/// Everything the UI needs to draw the progress screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    /// Headline progress text
    pub headline: String,
    /// One line per stage
    pub stages: Vec<StageLine>,
    /// Whether the retake action should be offered
    pub can_retake: bool,
    /// Whether the composite result can be shown
    pub result_ready: bool,
    /// Error text, if any
    pub error_text: Option<String>,
}

/// Display label of a stage
pub fn stage_label(stage: StageName) -> &'static str {
    match stage {
        StageName::FaceShape => "Face Shape Analysis",
        StageName::Features => "Facial Features Analysis",
        StageName::Overall => "Fortune Analysis",
    }
}

/// Render a snapshot
pub fn render(snapshot: &AnalysisSnapshot) -> StatusView {
    let running = snapshot.flow.is_live();
    // The first unfinished stage spins while the session is running
    let current = StageName::ALL
        .into_iter()
        .find(|stage| !snapshot.stage(*stage).is_terminal());

    let stages = StageName::ALL
        .into_iter()
        .map(|stage| {
            let status = snapshot.stage(stage).status();
            let (visual, text) = match status {
                StageStatus::Completed => (StageVisual::Done, "✓ Completed"),
                StageStatus::Failed => (StageVisual::Error, "× Failed"),
                StageStatus::Processing if running => (StageVisual::Spinning, "Analyzing..."),
                StageStatus::Pending if running && current == Some(stage) => {
                    (StageVisual::Spinning, "Analyzing...")
                }
                _ => (StageVisual::Idle, "Waiting"),
            };
            StageLine {
                stage,
                label: stage_label(stage),
                visual,
                text,
            }
        })
        .collect();

    StatusView {
        headline: headline(snapshot).to_string(),
        stages,
        can_retake: snapshot.flow != FlowState::Idle || snapshot.has_image,
        result_ready: snapshot.flow == FlowState::Done && snapshot.composite.is_some(),
        error_text: snapshot
            .error
            .as_ref()
            .map(|e| format!("{}. {}", e, e.hint())),
    }
}

fn headline(snapshot: &AnalysisSnapshot) -> &'static str {
    let done = |stage| snapshot.stage(stage).status() == StageStatus::Completed;

    match snapshot.flow {
        FlowState::Idle => "Ready",
        FlowState::Submitting | FlowState::Awaiting => "Preparing...",
        FlowState::Done => "Analysis complete!",
        FlowState::Failed => "Analysis failed",
        FlowState::InProgress => {
            if done(StageName::Features) {
                "Features complete! Running overall analysis..."
            } else if done(StageName::FaceShape) {
                "Face shape complete! Analyzing features..."
            } else {
                "Analyzing face shape..."
            }
        }
    }
}
