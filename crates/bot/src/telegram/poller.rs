//! Long-polling loop over `getUpdates`.

use std::time::Duration;

use comfybot_comfyui::retry::{next_delay, RetryConfig};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::telegram::api::TelegramApi;
use crate::transport::TransportError;

/// How long one `getUpdates` call waits for new updates.
pub const LONG_POLL_WAIT: Duration = Duration::from_secs(25);

/// Fetch updates and hand them to `dispatcher` until `cancel` fires.
///
/// Failed polls back off exponentially; a rate-limit answer waits for the
/// time the API asks for.
pub async fn run(
    api: &TelegramApi,
    dispatcher: &Dispatcher,
    wait: Duration,
    cancel: &CancellationToken,
) {
    let backoff = RetryConfig::default();
    let mut delay = backoff.initial_delay;
    let mut offset: i64 = 0;

    tracing::info!("Polling for chat updates");

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(offset, wait) => result,
        };

        let pause = match result {
            Ok(updates) => {
                delay = backoff.initial_delay;
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    dispatcher.handle_update(update).await;
                }
                continue;
            }
            Err(TransportError::Api {
                retry_after: Some(secs),
                ..
            }) => {
                tracing::warn!(retry_after = secs, "Rate limited while polling");
                Duration::from_secs(secs)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Polling for updates failed",
                );
                let pause = delay;
                delay = next_delay(delay, &backoff);
                pause
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    tracing::info!("Update polling stopped");
}
