//! One user interaction: prompt in, artifact out.
//!
//! `received -> submitted -> polling -> {delivered | failed}`. Every
//! failure rewrites the status message the user sees and ends the
//! interaction; nothing is retried at this level.

use std::sync::Arc;

use comfybot_comfyui::job::{JobError, JobRunner, JobStage};
use comfybot_core::seed::random_seed;
use comfybot_core::template::JobTemplate;
use comfybot_core::variant::{Delivery, VariantProfile};
use tokio_util::sync::CancellationToken;

use crate::messages;
use crate::transport::{ChatId, ChatTransport, MessageId, MessageRef, TransportError};

/// Shared, read-only dependencies of every interaction.
pub struct InteractionContext {
    pub transport: Arc<dyn ChatTransport>,
    pub runner: Arc<JobRunner>,
    /// Loaded once at startup; requests work on deep copies.
    pub template: Arc<JobTemplate>,
    pub profile: VariantProfile,
}

#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// Display name for logs.
    pub user: String,
    pub prompt: String,
}

#[derive(Debug, thiserror::Error)]
enum InteractionError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Failed to deliver result: {0}")]
    Delivery(#[from] TransportError),
}

/// Drive one interaction to its end and return the final stage.
pub async fn run_interaction(
    ctx: &InteractionContext,
    request: &PromptRequest,
    cancel: &CancellationToken,
) -> JobStage {
    let noun = ctx.profile.noun;
    tracing::info!(user = %request.user, prompt = %request.prompt, "Generation requested");

    let status = match ctx
        .transport
        .send_text(request.chat_id, &messages::started(noun), Some(request.message_id))
        .await
    {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "Failed to send status message");
            return JobStage::Failed;
        }
    };

    match generate(ctx, request, status, cancel).await {
        Ok(()) => {
            if let Err(e) = ctx.transport.delete_message(status).await {
                tracing::warn!(error = %e, "Failed to delete status message");
            }
            tracing::info!(stage = %JobStage::Delivered, "Generation delivered");
            JobStage::Delivered
        }
        Err(e) => {
            let text = match &e {
                InteractionError::Job(job) => messages::job_failure(job, noun),
                InteractionError::Delivery(_) => messages::generic_failure(&e),
            };
            tracing::warn!(stage = %JobStage::Failed, error = %e, "Generation failed");

            if let Err(edit) = ctx.transport.edit_text(status, &text).await {
                tracing::error!(error = %edit, "Failed to report generation failure");
            }
            JobStage::Failed
        }
    }
}

async fn generate(
    ctx: &InteractionContext,
    request: &PromptRequest,
    status: MessageRef,
    cancel: &CancellationToken,
) -> Result<(), InteractionError> {
    let bindings = &ctx.profile.bindings;

    let job = ctx
        .template
        .to_request(bindings, &request.prompt, random_seed())
        .map_err(JobError::from)?;

    let prompt_id = ctx.runner.submit(&job, cancel).await?;
    tracing::info!(stage = %JobStage::Submitted, prompt_id = %prompt_id, "Job submitted");

    if let Err(e) = ctx
        .transport
        .edit_text(status, &messages::processing(ctx.profile.noun))
        .await
    {
        tracing::warn!(error = %e, "Failed to update status message");
    }

    tracing::debug!(stage = %JobStage::Polling, prompt_id = %prompt_id, "Waiting for job");
    let entry = ctx.runner.await_completion(&prompt_id, cancel).await?;
    let artifact = ctx.runner.fetch(&entry, bindings.output_node, cancel).await?;

    let caption = messages::result_caption(&request.prompt);
    match ctx.profile.delivery {
        Delivery::Photo => {
            ctx.transport
                .send_photo(request.chat_id, artifact.bytes, &caption, Some(request.message_id))
                .await?;
        }
        Delivery::Document { filename } => {
            ctx.transport
                .send_document(
                    request.chat_id,
                    artifact.bytes,
                    filename,
                    &caption,
                    Some(request.message_id),
                )
                .await?;
        }
    }

    Ok(())
}
