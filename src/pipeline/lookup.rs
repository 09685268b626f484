//! Relevance & ranking — scores mailbox candidates against a user request
//! and returns either a merged context string or a ranked choice list.
//!
//! Candidates are processed concurrently; individual failures never fail
//! the batch, but they are tracked separately from "classified irrelevant"
//! so a systemic outage (every candidate erroring) surfaces as an error
//! instead of an empty result.

use std::sync::Arc;

use chrono::DateTime;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::CompletionProvider;
use crate::mail::{MailProvider, extract::extract_content};
use crate::pipeline::types::{LookupOutcome, RankedChoice};

/// Bound on the mailbox query result count.
const MAX_RESULTS: u32 = 50;

/// Maximum choices shown to the user.
const MAX_CHOICES_TO_SHOW: usize = 5;

/// Content cap for the relevance classification prompt.
const MAX_CONTENT_LENGTH: usize = 10_000;

/// Token budget for the vendor-derivation call.
const VENDOR_MAX_TOKENS: u32 = 10;

/// Token budget for the relevance classification call.
const RELEVANCE_MAX_TOKENS: u32 = 10;

/// Subjects containing any of these sort ahead of the rest.
const PRIORITY_KEYWORDS: [&str; 6] = [
    "order",
    "confirmation",
    "receipt",
    "invoice",
    "booking",
    "reservation",
];

/// Per-candidate classification result.
enum CandidateOutcome {
    Relevant(RankedChoice),
    Irrelevant,
    Failed,
}

/// Relevance & ranking pipeline over one mail account.
pub struct LookupPipeline {
    llm: Arc<dyn CompletionProvider>,
    mail: Arc<dyn MailProvider>,
}

impl LookupPipeline {
    pub fn new(llm: Arc<dyn CompletionProvider>, mail: Arc<dyn MailProvider>) -> Self {
        Self { llm, mail }
    }

    /// Derive the brand/company name a lookup task is about.
    pub async fn derive_vendor(&self, user_request: &str) -> Result<String, PipelineError> {
        let prompt = format!(
            "From the user request \"{user_request}\", what is the primary brand or company \
             name? Respond with only the company name."
        );
        Ok(self.llm.complete(&prompt, VENDOR_MAX_TOKENS).await?)
    }

    /// Search the mailbox for `vendor` and rank transactional matches.
    pub async fn find_information(
        &self,
        vendor: &str,
        user_request: &str,
    ) -> Result<LookupOutcome, PipelineError> {
        let query = format!("{vendor} in:inbox -category:promotions");
        info!(%query, "Searching mailbox");

        let refs = self.mail.list_messages(&query, MAX_RESULTS).await?;
        if refs.is_empty() {
            return Ok(LookupOutcome::resolved(format!(
                "I searched your emails for \"{vendor}\" but couldn't find any messages."
            )));
        }

        let total = refs.len();
        let outcomes = join_all(
            refs.iter()
                .map(|msg| self.process_candidate(&msg.id, user_request)),
        )
        .await;

        let mut choices = Vec::new();
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome {
                CandidateOutcome::Relevant(choice) => choices.push(choice),
                CandidateOutcome::Irrelevant => {}
                CandidateOutcome::Failed => failed += 1,
            }
        }

        if failed > 0 {
            warn!(failed, total, "Some candidates could not be classified");
        }
        if failed == total {
            return Err(PipelineError::AllCandidatesFailed { failed });
        }

        if choices.is_empty() {
            return Ok(LookupOutcome::resolved(format!(
                "I found some emails from \"{vendor}\", but after analysis, none seemed \
                 relevant to your request."
            )));
        }

        prioritize(&mut choices);
        info!(
            shown = choices.len().min(MAX_CHOICES_TO_SHOW),
            relevant = choices.len(),
            "Relevant emails ranked"
        );
        choices.truncate(MAX_CHOICES_TO_SHOW);
        Ok(LookupOutcome::selection(choices))
    }

    /// Fetch, extract, and classify one candidate.
    ///
    /// Any error along the way maps to `Failed` — excluded from ranking,
    /// counted for the all-failed check.
    async fn process_candidate(&self, id: &str, user_request: &str) -> CandidateOutcome {
        let message = match self.mail.get_message(id).await {
            Ok(message) => message,
            Err(e) => {
                warn!(message_id = %id, error = %e, "Failed to fetch candidate");
                return CandidateOutcome::Failed;
            }
        };

        let content = extract_content(self.mail.as_ref(), &message).await;
        let subject = message.header("subject").unwrap_or("No Subject").to_string();

        let prompt = relevance_prompt(user_request, &subject, &content);
        let verdict = match self.llm.complete(&prompt, RELEVANCE_MAX_TOKENS).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(message_id = %id, error = %e, "Relevance classification failed");
                return CandidateOutcome::Failed;
            }
        };

        debug!(message_id = %id, %subject, %verdict, "Classified candidate");
        if is_relevant_verdict(&verdict) {
            let date = message.header("date").unwrap_or("Unknown Date");
            CandidateOutcome::Relevant(RankedChoice {
                id: message.id.clone(),
                text: format!("{subject} (from {})", display_date(date)),
            })
        } else {
            CandidateOutcome::Irrelevant
        }
    }
}

/// The transactional-vs-marketing classification prompt.
fn relevance_prompt(user_request: &str, subject: &str, content: &str) -> String {
    let capped: String = content.chars().take(MAX_CONTENT_LENGTH).collect();
    format!(
        "You are an expert relevance detection assistant. Your primary task is to identify \
         transactional emails and ignore marketing/promotional content.\n\n\
         A transactional email contains specific, non-promotional information about a user's \
         action, such as an order confirmation, receipt, shipping notice, or appointment \
         detail.\n\n\
         CRITERIA: Analyze the email's subject and content. If you find specific transactional \
         data like an \"Order Number\", \"Order ID\", \"Receipt for your purchase\", \"Your \
         order has shipped\", or \"Your appointment is confirmed\", you MUST classify it as \
         \"Relevant\".\n\n\
         The presence of marketing material (like ads or \"you might also like\" sections) \
         does NOT make an email irrelevant if it also contains the core transactional data \
         mentioned above.\n\n\
         User Request: \"{user_request}\"\n\
         Email Subject: \"{subject}\"\n\
         Email Content (first {MAX_CONTENT_LENGTH} chars):\n\
         \"\"\"\n{capped}\n\"\"\"\n\n\
         Based on these rules, is this email transactional and relevant? Respond with only \
         the single word: \"Relevant\" or \"Irrelevant\"."
    )
}

/// Interpret the classifier's one-word verdict.
///
/// Matches on the leading word so that "Irrelevant" is never mistaken for
/// a substring hit on "relevant".
fn is_relevant_verdict(verdict: &str) -> bool {
    verdict
        .trim()
        .trim_matches(['"', '\'', '.'])
        .to_lowercase()
        .starts_with("relevant")
}

/// Stable partition: priority-keyword subjects first, relative order kept.
fn prioritize(choices: &mut [RankedChoice]) {
    choices.sort_by_key(|choice| {
        let text = choice.text.to_lowercase();
        !PRIORITY_KEYWORDS.iter().any(|kw| text.contains(kw))
    });
}

/// Render a Date header as a short local date, raw value on parse failure.
fn display_date(raw: &str) -> String {
    DateTime::parse_from_rfc2822(raw)
        .map(|dt| dt.format("%-m/%-d/%Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
