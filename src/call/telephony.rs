//! Telephony vendor adapter — places outbound calls with a persona payload.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::CallError;

/// Outbound-call endpoint.
const OUTBOUND_CALL_URL: &str = "https://api.elevenlabs.io/v1/convai/twilio/outbound-call";

/// Everything the vendor needs to place one call.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub phone_number: String,
    pub user_name: String,
    pub other_party_role: String,
    pub system_prompt: String,
    pub first_message: String,
}

/// Seam over the telephony vendor.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// Place an outbound call; returns the vendor call id.
    async fn place_call(&self, request: &CallRequest) -> Result<String, CallError>;
}

/// ElevenLabs conversational-AI client.
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: SecretString,
    agent_id: String,
    phone_number_id: String,
}

impl ElevenLabsClient {
    pub fn new(
        http: reqwest::Client,
        api_key: SecretString,
        agent_id: impl Into<String>,
        phone_number_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key,
            agent_id: agent_id.into(),
            phone_number_id: phone_number_id.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OutboundCallResponse {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default, rename = "callSid")]
    call_sid: Option<String>,
}

#[async_trait]
impl VoiceProvider for ElevenLabsClient {
    async fn place_call(&self, request: &CallRequest) -> Result<String, CallError> {
        let body = serde_json::json!({
            "agent_id": self.agent_id,
            "agent_phone_number_id": self.phone_number_id,
            "to_number": request.phone_number,
            "conversation_initiation_client_data": {
                "dynamic_variables": {
                    "user_name": request.user_name,
                    "other_party_role": request.other_party_role,
                },
                "conversation_config_override": {
                    "agent": {
                        "prompt": {"prompt": request.system_prompt},
                        "first_message": request.first_message,
                    },
                },
            },
        });

        let response = self
            .http
            .post(OUTBOUND_CALL_URL)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "Telephony API error");
            return Err(CallError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OutboundCallResponse = response
            .json()
            .await
            .map_err(|e| CallError::Request(e.to_string()))?;
        parsed
            .conversation_id
            .or(parsed.call_sid)
            .ok_or(CallError::MissingCallId)
    }
}
