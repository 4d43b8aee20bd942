//! Stage vocabulary
//!
//! An analysis job is split into three independently-completable stages.
//! The pipeline publishes them in no particular order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// One of the three sub-analyses of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageName {
    /// Face shape classification
    FaceShape,
    /// Facial features reading
    Features,
    /// Overall reading, carries the summary
    Overall,
}

impl StageName {
    /// All stages in display order
    pub const ALL: [StageName; 3] = [StageName::FaceShape, StageName::Features, StageName::Overall];

    /// Identifier used in topics and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::FaceShape => "faceShape",
            StageName::Features => "features",
            StageName::Overall => "overall",
        }
    }

    /// Position in [`StageName::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faceShape" => Ok(StageName::FaceShape),
            "features" => Ok(StageName::Features),
            "overall" => Ok(StageName::Overall),
            other => Err(ProtocolError::UnknownStage(other.to_string())),
        }
    }
}

/// Lifecycle of a single stage within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// No word from the pipeline yet
    #[default]
    Pending,
    /// Pipeline reported the stage as running
    Processing,
    /// Result received
    Completed,
    /// Stage reported a failure
    Failed,
}

impl StageStatus {
    /// Completed and Failed accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Processing => write!(f, "processing"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for StageStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(StageStatus::Pending),
            "processing" => Ok(StageStatus::Processing),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            _ => Err(ProtocolError::UnknownStatus(s.to_string())),
        }
    }
}
