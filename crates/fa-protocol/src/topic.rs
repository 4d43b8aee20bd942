//! Topic derivation and classification
//!
//! Every session owns a fixed set of topics under
//! `{namespace}/{session_id}/`:
//!
//! - `status` - per-stage progress updates
//! - `result/{stage}` - one result topic per [`StageName`]
//! - `error` - stage-level or job-level failures
//! - `completed` - advisory hint that the pipeline finished

use crate::error::ProtocolError;
use crate::session::SessionId;
use crate::stage::StageName;

/// Namespace the analysis pipeline publishes under
pub const DEFAULT_NAMESPACE: &str = "face-analysis";

/// Category of an inbound topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Progress update
    Status,
    /// Result for one stage
    StageResult(StageName),
    /// Failure report
    Error,
    /// Completion hint
    Completed,
}

/// The topics derived from one session id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    prefix: String,
    status: String,
    results: [String; 3],
    error: String,
    completed: String,
}

impl TopicSet {
    /// Derive the topic set for a session
    pub fn derive(namespace: &str, session_id: &SessionId) -> Self {
        let prefix = format!("{}/{}/", namespace.trim_end_matches('/'), session_id);
        let results = StageName::ALL.map(|stage| format!("{}result/{}", prefix, stage));

        Self {
            status: format!("{}status", prefix),
            error: format!("{}error", prefix),
            completed: format!("{}completed", prefix),
            results,
            prefix,
        }
    }

    /// Status topic
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Result topic for a stage
    pub fn result(&self, stage: StageName) -> &str {
        &self.results[stage.index()]
    }

    /// Error topic
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Completion hint topic
    pub fn completed(&self) -> &str {
        &self.completed
    }

    /// All topics in subscription order
    pub fn all(&self) -> Vec<&str> {
        let mut topics = Vec::with_capacity(6);
        topics.push(self.status.as_str());
        topics.extend(self.results.iter().map(String::as_str));
        topics.push(self.error.as_str());
        topics.push(self.completed.as_str());
        topics
    }

    /// Classify an inbound topic by its suffix.
    ///
    /// Topics outside this session's prefix are rejected so that a message
    /// addressed to another session can never be applied here.
    pub fn classify(&self, topic: &str) -> Result<TopicKind, ProtocolError> {
        let suffix = topic
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| ProtocolError::ForeignSession(topic.to_string()))?;

        match suffix {
            "status" => Ok(TopicKind::Status),
            "error" => Ok(TopicKind::Error),
            "completed" => Ok(TopicKind::Completed),
            _ => match suffix.strip_prefix("result/") {
                Some(stage) => stage.parse().map(TopicKind::StageResult),
                None => Err(ProtocolError::UnknownTopic(topic.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> TopicSet {
        TopicSet::derive(DEFAULT_NAMESPACE, &SessionId::parse("S1").unwrap())
    }

    #[test]
    fn test_derive_topic_names() {
        let topics = topics();
        assert_eq!(
            topics.all(),
            vec![
                "face-analysis/S1/status",
                "face-analysis/S1/result/faceShape",
                "face-analysis/S1/result/features",
                "face-analysis/S1/result/overall",
                "face-analysis/S1/error",
                "face-analysis/S1/completed",
            ]
        );
        assert_eq!(topics.result(StageName::Features), "face-analysis/S1/result/features");
    }

    #[test]
    fn test_namespace_trailing_slash_is_ignored() {
        let a = TopicSet::derive("ns/", &SessionId::parse("x").unwrap());
        let b = TopicSet::derive("ns", &SessionId::parse("x").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_classify_known_topics() {
        let topics = topics();
        assert_eq!(topics.classify("face-analysis/S1/status").unwrap(), TopicKind::Status);
        assert_eq!(topics.classify("face-analysis/S1/error").unwrap(), TopicKind::Error);
        assert_eq!(
            topics.classify("face-analysis/S1/completed").unwrap(),
            TopicKind::Completed
        );
        assert_eq!(
            topics.classify("face-analysis/S1/result/overall").unwrap(),
            TopicKind::StageResult(StageName::Overall)
        );
    }

    #[test]
    fn test_classify_rejects_other_sessions() {
        let topics = topics();
        assert!(matches!(
            topics.classify("face-analysis/S2/status"),
            Err(ProtocolError::ForeignSession(_))
        ));
        // S1 is a prefix of S10 but not the same session
        assert!(matches!(
            topics.classify("face-analysis/S10/status"),
            Err(ProtocolError::ForeignSession(_))
        ));
    }

    #[test]
    fn test_classify_unknown_suffixes() {
        let topics = topics();
        assert!(matches!(
            topics.classify("face-analysis/S1/result/palm"),
            Err(ProtocolError::UnknownStage(_))
        ));
        assert!(matches!(
            topics.classify("face-analysis/S1/progress"),
            Err(ProtocolError::UnknownTopic(_))
        ));
    }
}
