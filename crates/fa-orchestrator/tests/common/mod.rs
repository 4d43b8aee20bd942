//! Shared harness for orchestrator integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use fa_core::traits::{JobBackend, JobContext};
use fa_core::{CapturedImage, EventAccess, SubmissionError};
use fa_orchestrator::{AnalysisSnapshot, ChannelClient, MemoryBroker, Orchestrator};
use fa_protocol::{SessionId, StageName};

/// Upper bound for any single wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

/// Backend that answers start-job calls from a script
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<String, SubmissionError>>>,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a successful response
    pub fn accept(&self, session_id: &str) {
        self.responses.lock().push_back(Ok(session_id.to_string()));
    }

    /// Queue a failure
    pub fn reject(&self, error: SubmissionError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Hold the next start-job call until the returned notify fires
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn start_job(
        &self,
        _image: &CapturedImage,
        _context: &JobContext,
    ) -> Result<SessionId, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let next = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or(Err(SubmissionError::Network("no scripted response".into())));
        next.map(|raw| SessionId::parse(raw).expect("scripted session id"))
    }

    async fn check_event(&self, event_id: &str) -> Result<EventAccess, SubmissionError> {
        Ok(EventAccess {
            is_accessible: true,
            event_name: Some(event_id.to_string()),
            message: None,
        })
    }
}

/// Orchestrator wired to a scripted backend and an in-memory broker
pub struct Harness {
    pub broker: MemoryBroker,
    pub backend: Arc<ScriptedBackend>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stage_timeout(Duration::from_secs(120))
    }

    pub fn with_stage_timeout(timeout: Duration) -> Self {
        let broker = MemoryBroker::new();
        let backend = ScriptedBackend::new();
        let channel = ChannelClient::new(Arc::new(broker.clone()));
        let context = JobContext {
            event_id: "expo".into(),
            language: "en".into(),
        };
        let orchestrator = Orchestrator::new(backend.clone(), channel, context).with_stage_timeout(timeout);

        Self {
            broker,
            backend,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn image() -> CapturedImage {
        CapturedImage::new(vec![0xFFu8, 0xD8, 0xFF, 0xE0], "image/jpeg")
    }

    /// Publish a stage result for a session, returning the receiver count
    pub async fn result(&self, session: &str, stage: StageName, value: Value) -> usize {
        let topic = format!("face-analysis/{}/result/{}", session, stage);
        self.broker.publish_json(&topic, &json!({ "result": value })).await
    }

    pub async fn result_with_summary(&self, session: &str, stage: StageName, value: Value, summary: &str) -> usize {
        let topic = format!("face-analysis/{}/result/{}", session, stage);
        self.broker
            .publish_json(&topic, &json!({ "result": value, "summary": summary }))
            .await
    }

    pub async fn status(&self, session: &str, stage: StageName, status: &str) -> usize {
        let topic = format!("face-analysis/{}/status", session);
        self.broker
            .publish_json(&topic, &json!({ "stage": stage.as_str(), "status": status }))
            .await
    }

    pub async fn error(&self, session: &str, stage: Option<StageName>, text: &str) -> usize {
        let topic = format!("face-analysis/{}/error", session);
        let body = match stage {
            Some(stage) => json!({ "stage": stage.as_str(), "error": text }),
            None => json!({ "error": text }),
        };
        self.broker.publish_json(&topic, &body).await
    }

    pub async fn completed(&self, session: &str) -> usize {
        let topic = format!("face-analysis/{}/completed", session);
        self.broker.publish_json(&topic, &json!({ "done": true })).await
    }

    /// Wait until the published state satisfies a predicate
    pub async fn wait_for(&self, what: &str, predicate: impl Fn(&AnalysisSnapshot) -> bool) -> AnalysisSnapshot {
        let mut rx = self.orchestrator.subscribe_state();
        let waited = tokio::time::timeout(WAIT, async {
            rx.wait_for(|s| predicate(s)).await.map(|s| s.clone())
        })
        .await;
        match waited {
            Ok(Ok(snapshot)) => snapshot,
            _ => panic!("timed out waiting for {}: {:?}", what, self.orchestrator.state()),
        }
    }
}
