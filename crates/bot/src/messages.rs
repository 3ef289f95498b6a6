//! User-facing texts.

use comfybot_comfyui::job::JobError;

pub fn started(noun: &str) -> String {
    format!("🔄 Generating your {noun}...")
}

pub fn processing(noun: &str) -> String {
    format!("⏳ Processing {noun}...")
}

pub fn result_caption(prompt: &str) -> String {
    format!("✅ Result for: {prompt}")
}

pub fn cancel_ack(cancelled: usize) -> String {
    match cancelled {
        0 => "Nothing to cancel.".to_string(),
        1 => "Cancelling your generation.".to_string(),
        n => format!("Cancelling {n} generations."),
    }
}

/// Status-message text for a failed interaction.
pub fn job_failure(error: &JobError, noun: &str) -> String {
    match error {
        JobError::NotGenerated { .. } => format!("❌ Error: {noun} was not generated"),
        JobError::Cancelled => "🚫 Generation cancelled".to_string(),
        JobError::DeadlineExceeded(limit) => format!(
            "⌛ Generation took longer than {} min and was stopped",
            limit.as_secs().div_ceil(60)
        ),
        other => generic_failure(other),
    }
}

pub fn generic_failure(error: &dyn std::fmt::Display) -> String {
    format!("❌ Generation error: {error}")
}
