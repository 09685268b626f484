//! Detail extraction — pulls the structured fields a task needs out of a
//! chosen email, plus a best-effort phone number.

use std::sync::Arc;

use tracing::warn;

use crate::error::PipelineError;
use crate::llm::CompletionProvider;
use crate::mail::{MailProvider, extract::extract_content};
use crate::pipeline::types::EmailDetails;

/// Token budget for the needed-fields call.
const NEEDED_INFO_MAX_TOKENS: u32 = 150;

/// Token budget for the structured extraction call.
const EXTRACTION_MAX_TOKENS: u32 = 400;

/// Token budget for the phone-number call.
const PHONE_MAX_TOKENS: u32 = 25;

/// Extracts task-relevant fields from a chosen message.
pub struct DetailExtractor {
    llm: Arc<dyn CompletionProvider>,
    mail: Arc<dyn MailProvider>,
}

impl DetailExtractor {
    pub fn new(llm: Arc<dyn CompletionProvider>, mail: Arc<dyn MailProvider>) -> Self {
        Self { llm, mail }
    }

    /// Ask what fields the task needs, extract them from the message, and
    /// run a separate phone-number pass.
    pub async fn email_details(
        &self,
        message_id: &str,
        user_request: &str,
    ) -> Result<EmailDetails, PipelineError> {
        let needed_prompt = format!(
            "For a user request like \"{user_request}\", what information would an assistant \
             need to complete the task? List them separated by commas."
        );
        let needed_fields = self.llm.complete(&needed_prompt, NEEDED_INFO_MAX_TOKENS).await?;

        let message = self.mail.get_message(message_id).await?;
        let content = extract_content(self.mail.as_ref(), &message).await;

        let extraction_prompt = format!(
            "You are an expert information extractor. From the email content below, extract \
             the following fields: {needed_fields}.\n\n\
             CRITICAL RULE: The user's original request was \"{user_request}\". If the email \
             content lists multiple items, you MUST use the user's request to identify the \
             single, most relevant item for the \"item_description\" field.\n\n\
             Format the output as a JSON object where keys are the field names and values are \
             the extracted information. If a piece of information isn't found, use \"Not \
             Found\" as the value.\n\n\
             Respond with ONLY the JSON object.\n\n\
             Email Content: \"\"\"{content}\"\"\""
        );
        let raw = self.llm.complete(&extraction_prompt, EXTRACTION_MAX_TOKENS).await?;
        let context = parse_extracted_fields(&raw);

        let phone_prompt = format!(
            "From the text, extract a North American phone number in E.164 format. If none, \
             respond \"Not Found\".\n\nText: \"\"\"{content}\"\"\""
        );
        let phone_raw = self.llm.complete(&phone_prompt, PHONE_MAX_TOKENS).await?;
        let phone_number = normalize_phone(&phone_raw);

        Ok(EmailDetails {
            context,
            phone_number_from_email: phone_number,
        })
    }
}

/// Parse the extraction response into a field map.
///
/// Locates the first object literal in the raw text (tolerating prose and
/// code fences); on failure the raw text is returned under a single
/// catch-all key instead of propagating an error.
pub fn parse_extracted_fields(raw: &str) -> serde_json::Value {
    let candidate = extract_json_object(raw);
    match serde_json::from_str::<serde_json::Value>(&candidate) {
        Ok(value) if value.is_object() => value,
        _ => {
            warn!("Failed to parse extraction response as JSON, passing raw text through");
            serde_json::json!({"Raw Text": raw})
        }
    }
}

/// Pull a JSON object out of model output that may wrap it in markdown
/// fences or surrounding prose.
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```")
            && after[..end].trim().starts_with('{')
        {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Keep a phone answer only when it looks like an E.164 number.
fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('+') {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;
    use crate::error::{LlmError, MailError};
    use crate::mail::{EmailMessage, MessagePart, MessageRef, PartBody};

    // ── JSON extraction ─────────────────────────────────────────────

    #[test]
    fn extracts_bare_object() {
        let input = r#"{"a": "b"}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn extracts_from_json_fence_with_prose() {
        let input = "Sure! ```json\n{\"a\":\"b\"}\n```";
        assert_eq!(extract_json_object(input), "{\"a\":\"b\"}");
    }

    #[test]
    fn extracts_from_plain_fence() {
        let input = "```\n{\"order\": \"A-1\"}\n```";
        assert_eq!(extract_json_object(input), "{\"order\": \"A-1\"}");
    }

    #[test]
    fn extracts_embedded_object() {
        let input = "Here you go: {\"x\": 1} hope that helps";
        assert_eq!(extract_json_object(input), "{\"x\": 1}");
    }

    #[test]
    fn fenced_prose_parses_to_fields() {
        let value = parse_extracted_fields("Sure! ```json\n{\"a\":\"b\"}\n```");
        assert_eq!(value["a"], "b");
    }

    #[test]
    fn unparsable_text_becomes_raw_text_field() {
        let raw = "I couldn't find any structured data, sorry.";
        let value = parse_extracted_fields(raw);
        assert_eq!(value["Raw Text"], raw);
    }

    #[test]
    fn non_object_json_becomes_raw_text_field() {
        let value = parse_extracted_fields("[1, 2, 3]");
        assert_eq!(value["Raw Text"], "[1, 2, 3]");
    }

    // ── Phone normalization ─────────────────────────────────────────

    #[test]
    fn phone_kept_only_with_plus_prefix() {
        assert_eq!(normalize_phone("+15551234567"), Some("+15551234567".into()));
        assert_eq!(normalize_phone(" +15551234567 "), Some("+15551234567".into()));
        assert_eq!(normalize_phone("Not Found"), None);
        assert_eq!(normalize_phone("555-123-4567"), None);
        assert_eq!(normalize_phone(""), None);
    }

    // ── End-to-end with stubs ───────────────────────────────────────

    /// LLM stub dispatching on prompt markers.
    struct StubLlm {
        extraction_response: String,
        phone_response: String,
    }

    #[async_trait]
    impl CompletionProvider for StubLlm {
        async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
            if prompt.contains("what information would an assistant need") {
                Ok("order number, pickup time, store phone number".into())
            } else if prompt.contains("expert information extractor") {
                Ok(self.extraction_response.clone())
            } else {
                Ok(self.phone_response.clone())
            }
        }
    }

    struct StubMail;

    #[async_trait]
    impl MailProvider for StubMail {
        async fn list_messages(
            &self,
            _query: &str,
            _max_results: u32,
        ) -> Result<Vec<MessageRef>, MailError> {
            Ok(Vec::new())
        }

        async fn get_message(&self, id: &str) -> Result<EmailMessage, MailError> {
            Ok(EmailMessage {
                id: id.into(),
                snippet: String::new(),
                payload: MessagePart {
                    mime_type: Some("text/plain".into()),
                    body: Some(PartBody {
                        data: Some(URL_SAFE_NO_PAD.encode("Order A-1, call +15551230000")),
                        attachment_id: None,
                    }),
                    ..Default::default()
                },
            })
        }

        async fn get_attachment(
            &self,
            _message_id: &str,
            _attachment_id: &str,
        ) -> Result<Vec<u8>, MailError> {
            Err(MailError::Request("no attachments".into()))
        }
    }

    #[tokio::test]
    async fn details_parse_structured_response() {
        let extractor = DetailExtractor::new(
            Arc::new(StubLlm {
                extraction_response: "```json\n{\"order_number\": \"A-1\"}\n```".into(),
                phone_response: "+15551230000".into(),
            }),
            Arc::new(StubMail),
        );

        let details = extractor.email_details("m1", "pick up my order").await.unwrap();
        assert_eq!(details.context["order_number"], "A-1");
        assert_eq!(details.phone_number_from_email.as_deref(), Some("+15551230000"));
    }

    #[tokio::test]
    async fn details_fall_back_to_raw_text() {
        let extractor = DetailExtractor::new(
            Arc::new(StubLlm {
                extraction_response: "no structured data here".into(),
                phone_response: "Not Found".into(),
            }),
            Arc::new(StubMail),
        );

        let details = extractor.email_details("m1", "pick up my order").await.unwrap();
        assert_eq!(details.context["Raw Text"], "no structured data here");
        assert!(details.phone_number_from_email.is_none());
    }
}
