use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use comfybot_core::variant::Variant;

const DEFAULT_COMFYUI_API_URL: &str = "http://localhost:8188";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Longest accepted `JOB_DEADLINE_SECS`: one week.
const MAX_JOB_DEADLINE_SECS: u64 = 7 * 24 * 60 * 60;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything other than `json` means text.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Bot configuration loaded from environment variables.
///
/// Fixed for the lifetime of the process.
#[derive(Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub comfyui_api_url: String,
    pub telegram_api_url: String,
    pub variant: Variant,
    pub workflow_file: PathBuf,
    /// Upper bound on one job's wait, from submission to completion.
    pub job_deadline: Duration,
    pub retry_max_attempts: u32,
}

impl BotConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                       |
    /// |----------------------|-------------------------------|
    /// | `BOT_TOKEN`          | required                      |
    /// | `COMFYUI_API_URL`    | `http://localhost:8188`       |
    /// | `TELEGRAM_API_URL`   | `https://api.telegram.org`    |
    /// | `BOT_VARIANT`        | `image`                       |
    /// | `WORKFLOW_FILE`      | variant's template file       |
    /// | `JOB_DEADLINE_SECS`  | variant's deadline (max 1 week) |
    /// | `RETRY_MAX_ATTEMPTS` | `5`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable
    /// source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = var("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let variant = match var("BOT_VARIANT") {
            Some(raw) => raw.parse::<Variant>().map_err(|e| ConfigError::Invalid {
                name: "BOT_VARIANT",
                reason: e.to_string(),
            })?,
            None => Variant::Image,
        };
        let profile = variant.profile();

        let comfyui_api_url =
            var("COMFYUI_API_URL").unwrap_or_else(|| DEFAULT_COMFYUI_API_URL.into());
        let telegram_api_url =
            var("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.into());

        let workflow_file = var("WORKFLOW_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(profile.workflow_file));

        let job_deadline = match var("JOB_DEADLINE_SECS") {
            Some(raw) => {
                let secs = parse_positive("JOB_DEADLINE_SECS", &raw)?;
                if secs > MAX_JOB_DEADLINE_SECS {
                    return Err(ConfigError::Invalid {
                        name: "JOB_DEADLINE_SECS",
                        reason: format!("must be at most {MAX_JOB_DEADLINE_SECS}"),
                    });
                }
                Duration::from_secs(secs)
            }
            None => profile.deadline,
        };

        let retry_max_attempts = match var("RETRY_MAX_ATTEMPTS") {
            Some(raw) => u32::try_from(parse_positive("RETRY_MAX_ATTEMPTS", &raw)?).map_err(
                |e| ConfigError::Invalid {
                    name: "RETRY_MAX_ATTEMPTS",
                    reason: e.to_string(),
                },
            )?,
            None => DEFAULT_RETRY_MAX_ATTEMPTS,
        };

        Ok(Self {
            bot_token,
            comfyui_api_url,
            telegram_api_url,
            variant,
            workflow_file,
            job_deadline,
            retry_max_attempts,
        })
    }
}

// The token is a credential; keep it out of logs.
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &"<redacted>")
            .field("comfyui_api_url", &self.comfyui_api_url)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("variant", &self.variant)
            .field("workflow_file", &self.workflow_file)
            .field("job_deadline", &self.job_deadline)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .finish()
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".into(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}
