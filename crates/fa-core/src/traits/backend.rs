//! Analysis backend trait

use async_trait::async_trait;

use fa_protocol::SessionId;

use crate::error::SubmissionError;
use crate::types::{CapturedImage, EventAccess};

/// Context sent along with every job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    /// Event the photo was taken at
    pub event_id: String,
    /// Language the results should be written in
    pub language: String,
}

/// The backend start-job endpoint
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Upload an image and start a job, returning its session id
    async fn start_job(
        &self,
        image: &CapturedImage,
        context: &JobContext,
    ) -> Result<SessionId, SubmissionError>;

    /// Ask whether an event currently accepts submissions
    async fn check_event(&self, event_id: &str) -> Result<EventAccess, SubmissionError>;
}
