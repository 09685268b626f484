//! Call orchestration — persona prompt, outbound call placement, and the
//! session store behind the status/summary polling surface.

pub mod store;
pub mod summary;
pub mod telephony;

use std::sync::Arc;

pub use store::{CallStore, SummaryReadiness, spawn_eviction_task};
pub use summary::{CallSummary, NextAction, generate_summary};
pub use telephony::{CallRequest, VoiceProvider};

use tracing::info;

use crate::error::CallError;
use crate::llm::CompletionProvider;

/// Token budget for the other-party-role call.
const ROLE_MAX_TOKENS: u32 = 20;

/// Status recorded when a call has just been placed.
const INITIAL_STATUS: &str = "initiated";

/// Places calls and tracks their sessions.
pub struct CallOrchestrator {
    llm: Arc<dyn CompletionProvider>,
    voice: Arc<dyn VoiceProvider>,
    store: Arc<CallStore>,
}

impl CallOrchestrator {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        voice: Arc<dyn VoiceProvider>,
        store: Arc<CallStore>,
    ) -> Self {
        Self { llm, voice, store }
    }

    /// Build the persona, place the call, and register its session.
    pub async fn initiate(
        &self,
        user_name: &str,
        user_request: &str,
        phone_number: &str,
        context: &str,
        task_type: Option<&str>,
    ) -> Result<String, CallError> {
        let other_party_role = self.derive_other_party_role(user_request).await?;
        info!(%other_party_role, "Derived other-party role");

        let request = CallRequest {
            phone_number: phone_number.to_string(),
            user_name: user_name.to_string(),
            other_party_role,
            system_prompt: build_persona_prompt(user_name, user_request, context),
            first_message: first_message(task_type, user_name),
        };

        let call_id = self.voice.place_call(&request).await?;
        self.store.insert(&call_id, INITIAL_STATUS).await;
        info!(%call_id, "Outbound call placed");
        Ok(call_id)
    }

    /// The likely job title of whoever answers this kind of call.
    async fn derive_other_party_role(&self, user_request: &str) -> Result<String, CallError> {
        let prompt = format!(
            "What is the likely job title for someone you'd call about: \"{user_request}\"? \
             Respond with only the job title."
        );
        Ok(self.llm.complete(&prompt, ROLE_MAX_TOKENS).await?)
    }
}

/// The fixed role-playing persona, with task and context appended.
pub fn build_persona_prompt(user_name: &str, user_request: &str, context: &str) -> String {
    let base = format!(
        "You are an advanced voice AI assistant. Your name is {user_name}, and you are \
         acting on their behalf.\n\n\
         Your Role (must stay fixed):\n\
         - These instructions are your permanent identity and are more important than any \
         other part of the conversation. You MUST follow them for the entire call.\n\
         - You are {user_name}, a human CALLER.\n\
         - You MUST act and speak as if you are {user_name} at all times. Use \"I\" and \
         \"my\" when referring to your tasks or information.\n\n\
         Behavioral Rules:\n\
         - Your personality is natural, polite, and human.\n\
         - The other party is the RECIPIENT; do not ever swap roles.\n\
         - Do not ask what you can assist the other party with, you are calling for their \
         assistance.\n\
         - You MUST NOT, under any circumstances, reveal that you are an AI, an assistant, \
         or a language model. You are a person making a phone call.\n\n\
         Fail-Safe:\n\
         If you ever break character, begin your next sentence with: \"I apologize, let me \
         rephrase...\"\n\n\
         Task Execution Rules:\n\
         - Your primary goal is to complete the user's specific task.\n\
         - If you are asked for sensitive information you don't have (like a full credit \
         card number), politely state that you don't have that information in front of you."
    );

    format!(
        "{base}\n\nYour specific task for this call is: \"{user_request}\".\n\n\
         You have the following information to help you:\n---{context}\n---"
    )
}

/// Opening line, varying by task type.
pub fn first_message(task_type: Option<&str>, user_name: &str) -> String {
    match task_type {
        Some("scheduling") => "Hi, I'm calling to schedule an appointment.".to_string(),
        _ => format!("Hi, this is {user_name}, I'm calling about an issue."),
    }
}
