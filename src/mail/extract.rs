//! Email content extraction — flattens a message's part tree into one
//! normalized text blob.
//!
//! Breadth-first walk over the parts: plain text is appended as-is, HTML is
//! appended with tags stripped by a permissive pattern (entities and
//! malformed markup pass through), and PDF attachments are fetched and
//! text-extracted with start/end markers. A failed attachment becomes a
//! placeholder rather than aborting the walk.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::mail::{EmailMessage, MailProvider, MessagePart, decode_body_data};

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>?").unwrap());
static WHITESPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Flatten a message's textual parts and document attachments into one blob.
///
/// Never fails: per-attachment errors degrade to placeholders, and a message
/// with no textual content at all falls back to its preview snippet. The
/// result is whitespace-collapsed and trimmed.
pub async fn extract_content(mail: &dyn MailProvider, message: &EmailMessage) -> String {
    let mut combined = String::new();
    let mut queue: VecDeque<&MessagePart> = VecDeque::new();
    queue.push_back(&message.payload);

    while let Some(part) = queue.pop_front() {
        let mime = part.mime_type.as_deref().unwrap_or("");

        if mime == "text/plain" || mime == "text/html" {
            if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
                match decode_body_data(data) {
                    Ok(bytes) => {
                        let decoded = String::from_utf8_lossy(&bytes);
                        if mime == "text/html" {
                            combined.push_str(&strip_tags(&decoded));
                        } else {
                            combined.push_str(&decoded);
                        }
                        combined.push_str("\n\n");
                    }
                    Err(e) => {
                        warn!(message_id = %message.id, error = %e, "Skipping undecodable body part");
                    }
                }
            }
        }

        if let Some(filename) = part.filename.as_deref()
            && filename.to_lowercase().ends_with(".pdf")
            && let Some(attachment_id) = part.body.as_ref().and_then(|b| b.attachment_id.as_deref())
        {
            info!(message_id = %message.id, filename, "Found PDF attachment");
            match fetch_pdf_text(mail, &message.id, attachment_id).await {
                Ok(text) => {
                    combined.push_str(&format!("\n\n--- Start of PDF Content: {filename} ---\n"));
                    combined.push_str(&text);
                    combined.push_str(&format!("\n--- End of PDF Content: {filename} ---\n\n"));
                }
                Err(e) => {
                    warn!(message_id = %message.id, filename, error = %e, "Failed to extract PDF text");
                    combined.push_str(&format!("\n\n[Could not parse PDF: {filename}]\n\n"));
                }
            }
        }

        for child in &part.parts {
            queue.push_back(child);
        }
    }

    if combined.trim().is_empty() {
        combined = message.snippet.clone();
    }

    collapse_whitespace(&combined)
}

async fn fetch_pdf_text(
    mail: &dyn MailProvider,
    message_id: &str,
    attachment_id: &str,
) -> Result<String, String> {
    let bytes = mail
        .get_attachment(message_id, attachment_id)
        .await
        .map_err(|e| e.to_string())?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
}

/// Strip markup tags with a permissive pattern — not a full HTML parser.
fn strip_tags(html: &str) -> String {
    TAG_PATTERN.replace_all(html, " ").into_owned()
}

/// Collapse whitespace runs to single spaces and trim.
fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUNS.replace_all(text, " ").trim().to_string()
}
