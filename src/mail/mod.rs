//! Mail provider integration — Gmail REST adapter and message data model.
//!
//! Messages are fetched read-only per request; nothing is cached. The part
//! tree deserializes straight from the provider's JSON.

pub mod extract;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose;
use serde::Deserialize;

use crate::error::MailError;

/// Gmail REST base for the authenticated user.
const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Reference to a message returned by a list query.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

/// A full message: id, preview snippet, and the root of the part tree.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    #[serde(default)]
    pub snippet: String,
    pub payload: MessagePart,
}

impl EmailMessage {
    /// Case-insensitive header lookup on the root part.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// One node of the MIME part tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePart {
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Vec<Header>,
    pub body: Option<PartBody>,
    pub parts: Vec<MessagePart>,
}

/// A message header.
#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Inline body bytes and/or an out-of-band attachment reference.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartBody {
    pub data: Option<String>,
    pub attachment_id: Option<String>,
}

/// Seam over the mail provider. Read-only.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// List message refs matching `query`, bounded by `max_results`.
    async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, MailError>;

    /// Fetch a full message by id.
    async fn get_message(&self, id: &str) -> Result<EmailMessage, MailError>;

    /// Fetch attachment bytes by id, decoded.
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailError>;
}

/// Gmail REST client bound to one user's access token.
pub struct GmailClient {
    http: reqwest::Client,
    access_token: String,
}

impl GmailClient {
    pub fn new(http: reqwest::Client, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| MailError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "Gmail API error");
            return Err(MailError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| MailError::Request(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    data: String,
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, MailError> {
        let url = format!("{GMAIL_BASE}/messages");
        let list: ListResponse = self
            .get_json(
                &url,
                &[
                    ("q", query.to_string()),
                    ("maxResults", max_results.to_string()),
                ],
            )
            .await?;
        Ok(list.messages)
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage, MailError> {
        let url = format!("{GMAIL_BASE}/messages/{id}");
        self.get_json(&url, &[("format", "full".to_string())]).await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailError> {
        let url = format!("{GMAIL_BASE}/messages/{message_id}/attachments/{attachment_id}");
        let attachment: AttachmentResponse = self.get_json(&url, &[]).await?;
        decode_body_data(&attachment.data)
    }
}

/// Decode provider body data — base64url, padding optional.
pub fn decode_body_data(data: &str) -> Result<Vec<u8>, MailError> {
    let trimmed = data.trim();
    general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::URL_SAFE.decode(trimmed))
        .map_err(|e| MailError::Decode(e.to_string()))
}
