//! Environment-driven configuration.
//!
//! Every vendor integration reads its keys here once at startup. Missing
//! required keys are fatal (`ConfigError::MissingEnvVar`) — the service
//! refuses to boot half-configured.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default listen port.
const DEFAULT_PORT: u16 = 3000;

/// Default completion model.
const DEFAULT_MODEL: &str = "Llama-3.3-70B-Instruct";

/// Default TTL for call sessions that are never polled to completion.
const DEFAULT_CALL_SESSION_TTL_SECS: u64 = 3600;

/// Service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion API endpoint URL.
    pub llama_api_url: String,
    /// Completion API bearer key.
    pub llama_api_key: SecretString,
    /// Completion model name.
    pub llama_model: String,
    /// Optional token budget per rate-limit window (requests-only limiting
    /// when unset).
    pub llama_token_budget: Option<u64>,
    /// Google OAuth client id.
    pub google_client_id: String,
    /// Google OAuth client secret.
    pub google_client_secret: SecretString,
    /// Publicly reachable base URL, used to build the OAuth redirect URI.
    pub public_base_url: String,
    /// Telephony vendor API key.
    pub elevenlabs_api_key: SecretString,
    /// Telephony vendor agent id.
    pub elevenlabs_agent_id: String,
    /// Telephony vendor outbound phone number id.
    pub elevenlabs_phone_number_id: String,
    /// HTTP listen port.
    pub port: u16,
    /// How long unfinished call sessions are retained before eviction.
    pub call_session_ttl: Duration,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            llama_api_url: required("LLAMA_API_URL")?,
            llama_api_key: SecretString::from(required("LLAMA_API_KEY")?),
            llama_model: optional("LLAMA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            llama_token_budget: parse_optional("LLAMA_TOKEN_BUDGET")?,
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: SecretString::from(required("GOOGLE_CLIENT_SECRET")?),
            public_base_url: required("PUBLIC_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            elevenlabs_api_key: SecretString::from(required("ELEVENLABS_API_KEY")?),
            elevenlabs_agent_id: required("ELEVENLABS_AGENT_ID")?,
            elevenlabs_phone_number_id: required("ELEVENLABS_PHONE_NUMBER_ID")?,
            port: parse_optional("PORT")?.unwrap_or(DEFAULT_PORT),
            call_session_ttl: Duration::from_secs(
                parse_optional("CALL_SESSION_TTL_SECS")?.unwrap_or(DEFAULT_CALL_SESSION_TTL_SECS),
            ),
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
