//! `comfybot` -- chat front end for a ComfyUI server.
//!
//! Receives prompts from Telegram, runs them through the configured
//! ComfyUI template (image or video variant), and replies with the
//! generated artifact. See [`BotConfig::from_env`] for the environment
//! variables it reads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comfybot_bot::config::{BotConfig, LogFormat};
use comfybot_bot::dispatcher::Dispatcher;
use comfybot_bot::interaction::InteractionContext;
use comfybot_bot::telegram::{poller, TelegramApi};
use comfybot_comfyui::api::{ComfyUIApi, EngineApi};
use comfybot_comfyui::job::{JobRunner, JobSettings};
use comfybot_comfyui::retry::RetryConfig;
use comfybot_core::store::TemplateStore;

/// How long in-flight interactions get to wind down on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    // --- Configuration ---
    let config = BotConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        variant = %config.variant,
        comfyui = %config.comfyui_api_url,
        workflow_file = %config.workflow_file.display(),
        "Loaded bot configuration",
    );

    // --- Job template ---
    let store = TemplateStore::new(&config.workflow_file);
    let template = store
        .load_or_install(config.variant.default_template())
        .await
        .context("Failed to load job template")?;

    // --- ComfyUI ---
    let mut profile = config.variant.profile();
    profile.deadline = config.job_deadline;
    let retry = RetryConfig {
        max_attempts: config.retry_max_attempts,
        ..Default::default()
    };
    let api: Arc<dyn EngineApi> = Arc::new(ComfyUIApi::new(config.comfyui_api_url.clone()));
    let runner = Arc::new(JobRunner::new(api, JobSettings::from_profile(&profile, retry)));

    // --- Telegram ---
    let telegram = Arc::new(TelegramApi::new(
        config.telegram_api_url.clone(),
        config.bot_token.clone(),
    ));
    let me = telegram
        .get_me()
        .await
        .context("Telegram rejected the bot token")?;
    tracing::info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        "Connected to Telegram",
    );

    // --- Dispatch ---
    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(
        InteractionContext {
            transport: telegram.clone(),
            runner,
            template: Arc::new(template),
            profile,
        },
        shutdown.child_token(),
    );

    let poll_cancel = shutdown.child_token();
    tokio::select! {
        _ = poller::run(&telegram, &dispatcher, poller::LONG_POLL_WAIT, &poll_cancel) => {}
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // --- Shutdown ---
    shutdown.cancel();
    dispatcher.shutdown(SHUTDOWN_GRACE).await;
    tracing::info!("Bot stopped");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "comfybot=info,comfybot_bot=info,comfybot_comfyui=info,comfybot_core=info".into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the bot stops
/// cleanly whether run interactively or under a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
