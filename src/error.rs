//! Error types for FastTrack.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Classify a libSQL error raised by `context`.
    ///
    /// Unique-index violations become [`DatabaseError::Constraint`] so callers
    /// can treat them as "someone else got there first".
    pub fn from_libsql(context: &str, err: libsql::Error) -> Self {
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") {
            Self::Constraint(format!("{context}: {message}"))
        } else {
            Self::Query(format!("{context}: {message}"))
        }
    }

    /// Whether this is a uniqueness/constraint violation.
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download file on channel {name}: {reason}")]
    DownloadFailed { name: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },
}

/// Errors raised by an agent while producing its answer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Unexpected payload for agent {agent}: expected {expected}")]
    UnexpectedPayload {
        agent: &'static str,
        expected: &'static str,
    },

    #[error("Could not parse agent output: {0}")]
    Parse(String),
}

/// Login-code and session errors.
///
/// The `Display` text of the verification variants is shown to the user
/// verbatim, so it must stay free of internal detail.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Code has expired")]
    CodeExpired,

    #[error("Too many attempts")]
    TooManyAttempts,

    #[error("Code has already been used")]
    AlreadyUsed,

    #[error("Failed to generate unique code")]
    CodeSpaceExhausted,

    #[error("Verification failed")]
    VerificationFailed,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Invalid authentication data")]
    InvalidWidgetData,

    #[error("Authentication expired")]
    WidgetDataExpired,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
