//! Configuration types, loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Groq endpoint (OpenAI-compatible).
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_TEXT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub llm: LlmSettings,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub agents: AgentTimeouts,
    /// How long a photo message id is remembered for deduplication.
    pub dedup_window: Duration,
    /// Directory for rotated log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load everything from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            telegram: TelegramConfig::from_env()?,
            llm: LlmSettings::from_env()?,
            server: ServerConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            agents: AgentTimeouts::from_env()?,
            dedup_window: Duration::from_secs(env_parse("FASTTRACK_DEDUP_WINDOW_SECS", 300)?),
            log_dir: std::env::var("FASTTRACK_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids allowed to talk to the bot. `*` allows everyone.
    pub allowed_users: Vec<String>,
}

impl TelegramConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let allowed_users = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self {
            bot_token: SecretString::from(bot_token),
            allowed_users,
        })
    }
}

/// LLM provider settings shared by all agents.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: SecretString,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
}

impl LlmSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("GROQ_API_KEY"))
            .map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;
        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: env_or("LLM_BASE_URL", DEFAULT_LLM_BASE_URL),
            text_model: env_or("LLM_TEXT_MODEL", DEFAULT_TEXT_MODEL),
            vision_model: env_or("LLM_VISION_MODEL", DEFAULT_VISION_MODEL),
        })
    }
}

/// HTTP server and storage settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub db_path: PathBuf,
    /// Interval of the expired-session sweep.
    pub session_sweep_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            http_port: env_parse("FASTTRACK_HTTP_PORT", 8080)?,
            db_path: PathBuf::from(env_or("FASTTRACK_DB_PATH", "./data/fasttrack.db")),
            session_sweep_interval: Duration::from_secs(env_parse(
                "FASTTRACK_SESSION_SWEEP_SECS",
                3600,
            )?),
        })
    }
}

/// Login-code and session lifetimes.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Login codes expire after this long.
    ///
    /// Defaults to one minute even though the web page advertises five; the
    /// mismatch is carried over deliberately until product decides.
    pub login_code_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_code_ttl: Duration::from_secs(60),
            session_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let days: u64 = env_parse("FASTTRACK_SESSION_TTL_DAYS", 7)?;
        Ok(Self {
            login_code_ttl: Duration::from_secs(env_parse("FASTTRACK_LOGIN_CODE_TTL_SECS", 60)?),
            session_ttl: Duration::from_secs(days * 24 * 60 * 60),
        })
    }
}

/// Per-agent deadlines.
#[derive(Debug, Clone, Copy)]
pub struct AgentTimeouts {
    pub food: Duration,
    pub insights: Duration,
    pub summary: Duration,
    pub questions: Duration,
}

impl Default for AgentTimeouts {
    fn default() -> Self {
        Self {
            food: Duration::from_secs(60),
            insights: Duration::from_secs(30),
            summary: Duration::from_secs(30),
            // Longer: questions may pull the whole user history.
            questions: Duration::from_secs(60),
        }
    }
}

impl AgentTimeouts {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            food: secs("FASTTRACK_AGENT_TIMEOUT_FOOD_SECS", d.food)?,
            insights: secs("FASTTRACK_AGENT_TIMEOUT_INSIGHTS_SECS", d.insights)?,
            summary: secs("FASTTRACK_AGENT_TIMEOUT_SUMMARY_SECS", d.summary)?,
            questions: secs("FASTTRACK_AGENT_TIMEOUT_QUESTIONS_SECS", d.questions)?,
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(key, default.as_secs()).map(Duration::from_secs)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_accepts_padded_numbers() {
        let port: u16 = parse_value("PORT", " 9000 ").unwrap();
        assert_eq!(port, 9000);
    }

    #[test]
    fn parse_value_reports_key_on_failure() {
        let err = parse_value::<u16>("FASTTRACK_HTTP_PORT", "eighty").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, message } => {
                assert_eq!(key, "FASTTRACK_HTTP_PORT");
                assert!(message.contains("eighty"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_timeouts() {
        let t = AgentTimeouts::default();
        assert_eq!(t.food, Duration::from_secs(60));
        assert_eq!(t.insights, Duration::from_secs(30));
        assert_eq!(t.summary, Duration::from_secs(30));
        assert_eq!(t.questions, Duration::from_secs(60));
    }

    #[test]
    fn default_code_ttl_is_one_minute() {
        assert_eq!(AuthConfig::default().login_code_ttl, Duration::from_secs(60));
        assert_eq!(
            AuthConfig::default().session_ttl,
            Duration::from_secs(604_800)
        );
    }
}
