//! Configuration, built once from environment variables at startup and
//! passed by reference from there on. No ambient global state.

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::ModerationPolicy;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_SUBJECT_TOKEN: &str = "TTS";
pub const DEFAULT_MAX_BODY_CHARS: usize = 2000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Mailbox and outbound transport configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Account name; also used as the From address on replies.
    pub username: String,
    pub password: String,
    /// Subject token the unread search filters on.
    pub subject_token: String,
}

/// Moderation + speech oracle configuration.
#[derive(Clone)]
pub struct OracleConfig {
    pub api_key: SecretString,
    /// API root, e.g. `https://api.openai.com/v1`. Overridable for tests.
    pub base_url: String,
    pub tts_model: String,
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("tts_model", &self.tts_model)
            .finish()
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mail: MailConfig,
    pub oracle: OracleConfig,
    pub moderation: ModerationPolicy,
    /// Length-gate threshold in characters (bodies longer than this are skipped).
    pub max_body_chars: usize,
    pub poll_interval_secs: u64,
}

impl AppConfig {
    /// Build config from environment variables. Mandatory variables missing
    /// or invalid produce a `ConfigError`; everything else falls back to a
    /// default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let imap_host = required(&get, "EMAIL_IMAP_HOST")?;

        let imap_port: u16 = get("EMAIL_IMAP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host = required(&get, "EMAIL_SMTP_HOST")?;

        let smtp_port: u16 = get("EMAIL_SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = required(&get, "EMAIL_USERNAME")?;
        let password = required(&get, "EMAIL_PASSWORD")?;

        let subject_token =
            get("EMAIL_SUBJECT_TOKEN").unwrap_or_else(|| DEFAULT_SUBJECT_TOKEN.to_string());

        let poll_interval_secs: u64 = get("EMAIL_POLL_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_POLL_INTERVAL_SECS".to_string(),
                message: "must be at least 1 second".to_string(),
            });
        }

        let api_key: SecretString = required(&get, "OPENAI_API_KEY")?.into();

        let base_url = get("OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let tts_model = get("TTS_MODEL").unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string());

        let moderation = ModerationPolicy {
            force: get("FORCE_MODERATION").map(|s| parse_bool(&s)).unwrap_or(true),
            disabled: get("DISABLE_MODERATION")
                .map(|s| parse_bool(&s))
                .unwrap_or(false),
        };

        let max_body_chars: usize = get("MAX_BODY_CHARS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_BODY_CHARS);
        if max_body_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_BODY_CHARS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            mail: MailConfig {
                imap_host,
                imap_port,
                smtp_host,
                smtp_port,
                username,
                password,
                subject_token,
            },
            oracle: OracleConfig {
                api_key,
                base_url,
                tts_model,
            },
            moderation,
            max_body_chars,
            poll_interval_secs,
        })
    }
}

fn required<F>(get: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// `"true"` / `"1"` (any case) are true; everything else is false.
fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}
