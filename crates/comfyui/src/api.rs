//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (workflow submission, history retrieval,
//! artifact download, queue removal) using [`reqwest`]. Every call takes
//! its own timeout so each deployment can bound its requests differently.

use std::time::Duration;

use async_trait::async_trait;
use comfybot_core::template::JobTemplate;
use serde::Deserialize;

use crate::history::{ArtifactRef, History};

/// Timeout for the best-effort queue and interrupt calls.
const QUEUE_TIMEOUT: Duration = Duration::from_secs(10);

/// Type tag the `/view` endpoint expects for generated files.
const OUTPUT_TYPE: &str = "output";

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
}

/// Snapshot of the ComfyUI execution queue from `GET /queue`.
///
/// Each entry is `[number, prompt_id, prompt, extra_data, outputs]`; only
/// the prompt id is read.
#[derive(Debug, Default, Deserialize)]
pub struct QueueState {
    #[serde(default)]
    pub queue_running: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub queue_pending: Vec<Vec<serde_json::Value>>,
}

impl QueueState {
    /// Whether `prompt_id` is executing right now.
    pub fn is_running(&self, prompt_id: &str) -> bool {
        self.queue_running
            .iter()
            .any(|entry| entry.get(1).and_then(serde_json::Value::as_str) == Some(prompt_id))
    }
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The TCP/TLS connection could not be established.
    #[error("Cannot connect to ComfyUI: {0}")]
    Connect(String),

    /// The request was sent but no answer arrived in time.
    #[error("ComfyUI request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body does not have the expected shape.
    #[error("Invalid ComfyUI response: {0}")]
    InvalidResponse(String),
}

impl ComfyUIApiError {
    /// Failures worth retrying: the server was unreachable or slow.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }

    /// The request never reached the server, so resending it cannot
    /// create a duplicate.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

impl From<reqwest::Error> for ComfyUIApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// The engine operations a job needs.
///
/// [`ComfyUIApi`] is the production implementation; tests drive the job
/// runner through scripted fakes.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// `POST /prompt`.
    async fn submit_workflow(
        &self,
        workflow: &JobTemplate,
        timeout: Duration,
    ) -> Result<SubmitResponse, ComfyUIApiError>;

    /// `GET /history/{prompt_id}`.
    async fn get_history(
        &self,
        prompt_id: &str,
        timeout: Duration,
    ) -> Result<History, ComfyUIApiError>;

    /// `GET /view?filename&subfolder&type=output`.
    async fn view(
        &self,
        artifact: &ArtifactRef,
        timeout: Duration,
    ) -> Result<Vec<u8>, ComfyUIApiError>;

    /// `POST /queue` with `{"delete": [prompt_id]}`.
    async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError>;

    /// `GET /queue`.
    async fn get_queue(&self) -> Result<QueueState, ComfyUIApiError>;

    /// `POST /interrupt` with `{"prompt_id": prompt_id}`. Stops the
    /// execution in progress; the queue delete alone does not.
    async fn interrupt(&self, prompt_id: &str) -> Result<(), ComfyUIApiError>;
}

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Base HTTP API URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Client ID attached to every submission.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ComfyUIApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl EngineApi for ComfyUIApi {
    async fn submit_workflow(
        &self,
        workflow: &JobTemplate,
        timeout: Duration,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get_history(
        &self,
        prompt_id: &str,
        timeout: Duration,
    ) -> Result<History, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(timeout)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn view(
        &self,
        artifact: &ArtifactRef,
        timeout: Duration,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", OUTPUT_TYPE),
            ])
            .timeout(timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .timeout(QUEUE_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn get_queue(&self) -> Result<QueueState, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.api_url))
            .timeout(QUEUE_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn interrupt(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt_id": prompt_id,
        });

        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .timeout(QUEUE_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}
