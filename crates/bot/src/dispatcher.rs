//! Routes inbound chat updates.
//!
//! `/start` greets, `/cancel` stops the chat's running generations, other
//! commands are ignored, and free text starts a new interaction on its
//! own task.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::interaction::{run_interaction, InteractionContext, PromptRequest};
use crate::messages;
use crate::registry::InteractionRegistry;
use crate::telegram::types::{Inbound, Message, Update};

pub struct Dispatcher {
    ctx: Arc<InteractionContext>,
    registry: Arc<InteractionRegistry>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// `shutdown` is the parent of every interaction's token.
    pub fn new(ctx: InteractionContext, shutdown: CancellationToken) -> Self {
        Self {
            ctx: Arc::new(ctx),
            registry: InteractionRegistry::new(shutdown.clone()),
            tasks: TaskTracker::new(),
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<InteractionRegistry> {
        &self.registry
    }

    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            tracing::trace!(update_id = update.update_id, "Ignoring non-message update");
            return;
        };

        match message.inbound() {
            Some(Inbound::Command { name: "start", .. }) => self.greet(&message).await,
            Some(Inbound::Command { name: "cancel", .. }) => self.cancel(&message).await,
            Some(Inbound::Command { name, .. }) => {
                tracing::debug!(chat_id = message.chat.id, command = name, "Ignoring command");
            }
            Some(Inbound::Prompt(prompt)) => {
                let prompt = prompt.to_string();
                self.spawn_interaction(&message, prompt);
            }
            None => {}
        }
    }

    /// Cancel every running interaction and wait up to `grace` for their
    /// tasks to report back.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();
        self.tasks.close();

        let running = self.tasks.len();
        tracing::info!(running, "Waiting for interactions to finish");

        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tasks.len(),
                "Interactions still running after shutdown grace period",
            );
        }
    }

    /// Wait for every spawned interaction to finish, without cancelling.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    // ---- private helpers ----

    async fn greet(&self, message: &Message) {
        if let Err(e) = self
            .ctx
            .transport
            .send_text(message.chat.id, self.ctx.profile.greeting, Some(message.message_id))
            .await
        {
            tracing::warn!(chat_id = message.chat.id, error = %e, "Failed to send greeting");
        }
    }

    async fn cancel(&self, message: &Message) {
        let cancelled = self.registry.cancel_chat(message.chat.id);
        tracing::info!(chat_id = message.chat.id, cancelled, "Cancel requested");

        if let Err(e) = self
            .ctx
            .transport
            .send_text(
                message.chat.id,
                &messages::cancel_ack(cancelled),
                Some(message.message_id),
            )
            .await
        {
            tracing::warn!(chat_id = message.chat.id, error = %e, "Failed to acknowledge cancel");
        }
    }

    fn spawn_interaction(&self, message: &Message, prompt: String) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let request = PromptRequest {
            chat_id: message.chat.id,
            message_id: message.message_id,
            user: message
                .from
                .as_ref()
                .map(|u| u.first_name.clone())
                .unwrap_or_default(),
            prompt,
        };

        let handle = self.registry.begin(request.chat_id);
        let ctx = Arc::clone(&self.ctx);
        let span = tracing::info_span!(
            "interaction",
            chat_id = request.chat_id,
            message_id = request.message_id,
        );

        self.tasks.spawn(
            async move {
                let stage = run_interaction(&ctx, &request, handle.token()).await;
                tracing::debug!(%stage, "Interaction finished");
                drop(handle);
            }
            .instrument(span),
        );
    }
}
