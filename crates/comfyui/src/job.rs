//! Job lifecycle against one ComfyUI instance: submit, poll, fetch.
//!
//! [`JobRunner`] owns no per-job state. Each call works on the request or
//! history entry handed to it, so a single runner is shared by every
//! in-flight interaction.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use comfybot_core::error::CoreError;
use comfybot_core::template::JobRequest;
use comfybot_core::variant::VariantProfile;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApiError, EngineApi};
use crate::history::{ArtifactRef, HistoryEntry, JobStatus};
use crate::retry::{retry_with_backoff, RetryConfig, RetryError};

/// Timing and retry knobs for one deployment.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub submit_timeout: Duration,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    /// Upper bound on the wait between submission and completion.
    pub deadline: Duration,
    pub retry: RetryConfig,
}

impl JobSettings {
    pub fn from_profile(profile: &VariantProfile, retry: RetryConfig) -> Self {
        Self {
            submit_timeout: profile.submit_timeout,
            poll_timeout: profile.poll_timeout,
            poll_interval: profile.poll_interval,
            fetch_timeout: profile.fetch_timeout,
            deadline: profile.deadline,
            retry,
        }
    }
}

/// Where an interaction currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Received,
    Submitted,
    Polling,
    Delivered,
    Failed,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Received => "received",
            JobStage::Submitted => "submitted",
            JobStage::Polling => "polling",
            JobStage::Delivered => "delivered",
            JobStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A downloaded artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub reference: ArtifactRef,
    pub bytes: Vec<u8>,
}

/// Errors that end a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The template could not be parameterized.
    #[error("Invalid job template: {0}")]
    Template(#[from] CoreError),

    /// The engine could not be reached or answered with an error status.
    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    /// The engine ran the job and reported a failure.
    #[error("ComfyUI error: {0}")]
    Engine(String),

    /// The job completed without producing an artifact.
    #[error("No artifact produced by node {node}")]
    NotGenerated { node: String },

    #[error("Job did not finish within {}s", .0.as_secs())]
    DeadlineExceeded(Duration),

    #[error("Job cancelled")]
    Cancelled,
}

impl From<RetryError<ComfyUIApiError>> for JobError {
    fn from(e: RetryError<ComfyUIApiError>) -> Self {
        match e {
            RetryError::Cancelled => JobError::Cancelled,
            RetryError::Failed { source, .. } => JobError::Api(source),
        }
    }
}

pub struct JobRunner {
    api: Arc<dyn EngineApi>,
    settings: JobSettings,
}

impl JobRunner {
    pub fn new(api: Arc<dyn EngineApi>, settings: JobSettings) -> Self {
        Self { api, settings }
    }

    /// Submit a parameterized job and return the engine's `prompt_id`.
    ///
    /// Only connection failures are retried: once the request may have
    /// reached the engine, resending it could queue the job twice.
    pub async fn submit(
        &self,
        request: &JobRequest,
        cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        let response = retry_with_backoff(
            &self.settings.retry,
            cancel,
            "submit",
            ComfyUIApiError::is_connect,
            || {
                self.api
                    .submit_workflow(&request.workflow, self.settings.submit_timeout)
            },
        )
        .await?;

        tracing::info!(
            prompt_id = %response.prompt_id,
            queue_position = ?response.number,
            seed = request.seed,
            "Workflow submitted to ComfyUI",
        );

        Ok(response.prompt_id)
    }

    /// Poll the history endpoint until the job completes or fails.
    ///
    /// Gives up when `cancel` fires or the deadline passes; in both cases
    /// the job is also dropped from the engine queue.
    pub async fn await_completion(
        &self,
        prompt_id: &str,
        cancel: &CancellationToken,
    ) -> Result<HistoryEntry, JobError> {
        let deadline = deadline_from_now(self.settings.deadline);
        let mut polls = 0u32;

        let result = loop {
            polls += 1;

            let lookup = tokio::time::timeout_at(deadline, self.poll_once(prompt_id, cancel)).await;
            let status = match lookup {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => break Err(e),
                Err(_) => break Err(JobError::DeadlineExceeded(self.settings.deadline)),
            };

            match status {
                JobStatus::Completed(entry) => {
                    tracing::info!(prompt_id, polls, "ComfyUI job completed");
                    break Ok(entry);
                }
                JobStatus::Failed { message } => {
                    tracing::warn!(prompt_id, polls, error = %message, "ComfyUI job failed");
                    break Err(JobError::Engine(message));
                }
                JobStatus::Pending => {
                    tracing::debug!(prompt_id, polls, "ComfyUI job pending");
                }
            }

            let wake = (Instant::now() + self.settings.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => break Err(JobError::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }

            if Instant::now() >= deadline {
                break Err(JobError::DeadlineExceeded(self.settings.deadline));
            }
        };

        if matches!(result, Err(JobError::Cancelled | JobError::DeadlineExceeded(_))) {
            self.abandon(prompt_id).await;
        }

        result
    }

    /// Download the first artifact `output_node` produced.
    pub async fn fetch(
        &self,
        entry: &HistoryEntry,
        output_node: &str,
        cancel: &CancellationToken,
    ) -> Result<Artifact, JobError> {
        let reference = entry
            .first_artifact(output_node)
            .cloned()
            .ok_or_else(|| JobError::NotGenerated {
                node: output_node.to_string(),
            })?;

        let bytes = retry_with_backoff(
            &self.settings.retry,
            cancel,
            "view",
            ComfyUIApiError::is_transient,
            || self.api.view(&reference, self.settings.fetch_timeout),
        )
        .await?;

        tracing::info!(
            filename = %reference.filename,
            subfolder = %reference.subfolder,
            size = bytes.len(),
            "Fetched ComfyUI artifact",
        );

        Ok(Artifact { reference, bytes })
    }

    /// Drop a job from the engine queue, and interrupt it when it is
    /// already executing. Failures are only logged: the interaction is
    /// already over.
    pub async fn abandon(&self, prompt_id: &str) {
        match self.api.cancel_execution(prompt_id).await {
            Ok(()) => tracing::info!(prompt_id, "Removed job from ComfyUI queue"),
            Err(e) => tracing::warn!(prompt_id, error = %e, "Failed to remove job from queue"),
        }

        match self.api.get_queue().await {
            Ok(queue) if queue.is_running(prompt_id) => match self.api.interrupt(prompt_id).await {
                Ok(()) => tracing::info!(prompt_id, "Interrupted running ComfyUI job"),
                Err(e) => tracing::warn!(prompt_id, error = %e, "Failed to interrupt job"),
            },
            Ok(_) => {}
            Err(e) => tracing::warn!(prompt_id, error = %e, "Failed to read ComfyUI queue"),
        }
    }

    // ---- private helpers ----

    async fn poll_once(
        &self,
        prompt_id: &str,
        cancel: &CancellationToken,
    ) -> Result<JobStatus, JobError> {
        let history = retry_with_backoff(
            &self.settings.retry,
            cancel,
            "history",
            ComfyUIApiError::is_transient,
            || self.api.get_history(prompt_id, self.settings.poll_timeout),
        )
        .await?;

        Ok(JobStatus::from_history(history, prompt_id))
    }
}

/// Stand-in for "no deadline" when the configured one does not fit in an
/// [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_from_now(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit).unwrap_or_else(|| now + FAR_FUTURE)
}
