//! Post-call summarization — turns a transcript into a structured summary
//! with an optional follow-up calendar action.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::EventDetails;
use crate::error::LlmError;
use crate::llm::CompletionProvider;
use crate::pipeline::details::extract_json_object;

/// Token budget for the summary call.
const SUMMARY_MAX_TOKENS: u32 = 500;

/// Token budget for the follow-up recovery call.
const RECOVERY_MAX_TOKENS: u32 = 200;

/// Structured post-call summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    /// One-paragraph narrative of the call.
    #[serde(default)]
    pub summary: String,
    /// Short, definitive outcome statement.
    #[serde(default)]
    pub result: String,
    /// Whether a follow-up action is required.
    #[serde(default)]
    pub follow_up: bool,
    /// Follow-up description, when one exists.
    #[serde(default)]
    pub next_action: Option<NextAction>,
}

impl CallSummary {
    /// Fallback when the model's answer can't be structured.
    fn unstructured() -> Self {
        Self {
            summary: "The summary was not in valid JSON format.".into(),
            result: "Summary could not be structured.".into(),
            follow_up: false,
            next_action: None,
        }
    }

    /// Render the user-facing summary text.
    pub fn display_text(&self) -> String {
        format!(
            "**Summary:**\n{}\n\n**Result:**\n{}",
            self.summary, self.result
        )
    }
}

/// A follow-up action detected in the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextAction {
    pub action_type: String,
    #[serde(flatten)]
    pub event: EventDetails,
}

impl NextAction {
    /// Whether this action asks for a calendar insert.
    pub fn is_calendar_event(&self) -> bool {
        self.action_type == "create_calendar_event"
    }
}

/// Summarize a call transcript.
///
/// Vendor/transport failures propagate; a response that can't be parsed
/// degrades to the unstructured fallback. When the outcome text implies a
/// booking but no follow-up action was produced, a recovery pass asks the
/// model to extract the event details from the outcome sentence.
pub async fn generate_summary(
    llm: &dyn CompletionProvider,
    transcript: &str,
    time_zone: Option<&str>,
) -> Result<CallSummary, LlmError> {
    let tz = time_zone.unwrap_or("UTC");
    let today = Utc::now().format("%a %b %e %Y");
    let prompt = format!(
        "You are a post-call analysis expert. Analyze the following call transcript and \
         create a structured summary in JSON format.\n\n\
         CRITICAL CONTEXT:\n\
         - Today's date is {today}.\n\
         - The user's local timezone is \"{tz}\". You MUST use this timezone for all date \
         and time fields in your response.\n\n\
         Your JSON output MUST have these fields:\n\
         - \"summary\": A one-paragraph narrative of the call.\n\
         - \"result\": A short, definitive outcome statement.\n\
         - \"followUp\": A boolean value. Set to true if a follow-up action is required.\n\
         - \"nextAction\": An object describing the follow-up. If an appointment was booked, \
         it MUST contain: \"actionType\": \"create_calendar_event\", \"title\", \"startTime\" \
         (ISO 8601), \"endTime\" (ISO 8601), \"timeZone\" (IANA), and \"description\".\n\n\
         Analyze this transcript and provide ONLY the JSON object as a response.\n\
         Transcript: \"\"\"{transcript}\"\"\""
    );

    let raw = llm.complete(&prompt, SUMMARY_MAX_TOKENS).await?;
    let mut summary = match parse_summary(&raw) {
        Some(summary) => summary,
        None => {
            warn!("Failed to parse summary JSON, using unstructured fallback");
            return Ok(CallSummary::unstructured());
        }
    };

    if summary.next_action.is_none() && result_implies_booking(&summary.result) {
        info!("Summary outcome implies a booking but carried no follow-up, recovering");
        summary.next_action = recover_next_action(llm, &summary.result, tz).await;
        if summary.next_action.is_some() {
            summary.follow_up = true;
        }
    }

    Ok(summary)
}

fn parse_summary(raw: &str) -> Option<CallSummary> {
    serde_json::from_str(&extract_json_object(raw)).ok()
}

/// Does the outcome text claim an appointment was made?
fn result_implies_booking(result: &str) -> bool {
    let lowered = result.to_lowercase();
    lowered.contains("booked") || lowered.contains("scheduled")
}

/// Second-chance extraction of event details from the outcome sentence.
async fn recover_next_action(
    llm: &dyn CompletionProvider,
    result: &str,
    time_zone: &str,
) -> Option<NextAction> {
    let today = Utc::now().format("%a %b %e %Y");
    let prompt = format!(
        "Today's date is {today}. The user's timezone is \"{time_zone}\".\n\
         Extract the event details from the following sentence into a JSON object with keys \
         \"title\", \"startTime\" (ISO 8601), \"endTime\" (ISO 8601), \"timeZone\", and \
         \"description\". Derive a concise title from the sentence. Assume the appointment \
         is 1 hour long if an end time is not specified.\n\
         Sentence: \"{result}\"\n\
         Respond with ONLY the JSON object."
    );

    let raw = match llm.complete(&prompt, RECOVERY_MAX_TOKENS).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Follow-up recovery call failed");
            return None;
        }
    };

    match serde_json::from_str::<EventDetails>(&extract_json_object(&raw)) {
        Ok(event) => Some(NextAction {
            action_type: "create_calendar_event".into(),
            event,
        }),
        Err(e) => {
            warn!(error = %e, "Follow-up recovery produced unparsable event details");
            None
        }
    }
}
