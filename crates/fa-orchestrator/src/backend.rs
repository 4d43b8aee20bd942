//! HTTP analysis backend
//!
//! | call        | request                                          | response                 |
//! |-------------|--------------------------------------------------|--------------------------|
//! | start job   | `POST {api}/analyze` `{image, event_id, language}` | `{session_id}`         |
//! | event check | `GET {api}/checkEvent?event=<id>`                | `{isAccessible, eventName?, message?}` |
//!
//! Error bodies carry `error` or `message`; either is surfaced in
//! [`SubmissionError::Rejected`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fa_core::config::ClientConfig;
use fa_core::traits::{JobBackend, JobContext};
use fa_core::{CapturedImage, EventAccess, SubmissionError};
use fa_protocol::SessionId;

/// Start-job request body
#[derive(Debug, Serialize)]
struct StartJobRequest<'a> {
    image: String,
    event_id: &'a str,
    language: &'a str,
}

/// Start-job success body
#[derive(Debug, Deserialize)]
struct StartJobResponse {
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
}

/// Error body shape shared by both endpoints
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Backend client over HTTP
#[derive(Debug, Clone)]
pub struct HttpJobBackend {
    client: reqwest::Client,
    api_endpoint: String,
}

impl HttpJobBackend {
    /// Create a backend for an API base URL
    pub fn new(api_endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SubmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_endpoint: api_endpoint.into(),
        })
    }

    /// Create a backend from client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, SubmissionError> {
        Self::new(config.api_endpoint.clone(), config.request_timeout)
    }

    /// Endpoint URL for a path, without doubled slashes
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl JobBackend for HttpJobBackend {
    async fn start_job(
        &self,
        image: &CapturedImage,
        context: &JobContext,
    ) -> Result<SessionId, SubmissionError> {
        if image.is_empty() {
            return Err(SubmissionError::Encode("image is empty".into()));
        }

        let body = StartJobRequest {
            image: image.to_base64(),
            event_id: &context.event_id,
            language: &context.language,
        };

        tracing::info!(
            "Starting analysis job ({} bytes, event {}, language {})",
            image.len(),
            context.event_id,
            context.language
        );

        let response = self
            .client
            .post(self.url("analyze"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejected(status, response).await);
        }

        let body: StartJobResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::Network(format!("invalid response body: {}", e)))?;

        let session_id = body
            .session_id
            .and_then(|raw| SessionId::parse(raw).ok())
            .ok_or(SubmissionError::MissingSessionId)?;

        tracing::info!("Backend accepted job as session {}", session_id);
        Ok(session_id)
    }

    async fn check_event(&self, event_id: &str) -> Result<EventAccess, SubmissionError> {
        let response = self
            .client
            .get(self.url("checkEvent"))
            .query(&[("event", event_id)])
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejected(status, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| SubmissionError::Network(format!("invalid response body: {}", e)))
    }
}

async fn rejected(status: reqwest::StatusCode, response: reqwest::Response) -> SubmissionError {
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    let message = body
        .error
        .or(body.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                text
            }
        });

    tracing::warn!("Backend rejected request with {}: {}", status, message);

    SubmissionError::Rejected {
        status: status.as_u16(),
        message,
    }
}
