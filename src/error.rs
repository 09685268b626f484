//! Error types for Timely Agent.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// OAuth flow errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization code exchange failed: {0}")]
    Exchange(String),
}

/// Completion API errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Completion API request failed: {0}")]
    Request(String),

    #[error("Completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Completion response matched neither known shape")]
    UnrecognizedResponse,
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail API request failed: {0}")]
    Request(String),

    #[error("Mail API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode message body: {0}")]
    Decode(String),
}

/// Calendar provider errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar API request failed: {0}")]
    Request(String),

    #[error("Calendar API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Telephony vendor errors.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Telephony API request failed: {0}")]
    Request(String),

    #[error("Telephony API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Telephony response carried no call id")]
    MissingCallId,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Email lookup pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("All {failed} candidate messages failed to process")]
    AllCandidatesFailed { failed: usize },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
