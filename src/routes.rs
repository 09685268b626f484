//! HTTP surface — OAuth, lookup/scheduling preparation, call placement,
//! webhook intake, and the status/summary polling endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::auth::{GoogleTokens, OAuthFlow, SessionStore, session_cookie, session_id_from_headers};
use crate::calendar::{CalendarProvider, format_busy_slots};
use crate::call::{CallOrchestrator, CallStore, SummaryReadiness, generate_summary};
use crate::llm::CompletionProvider;
use crate::mail::MailProvider;
use crate::pipeline::{DetailExtractor, LookupPipeline};

/// Per-session Google API construction.
///
/// Mail and calendar clients are bound to one user's access token, so the
/// router holds a factory rather than clients. Tests substitute stubs here.
pub trait GoogleApis: Send + Sync {
    fn mail(&self, access_token: &str) -> Arc<dyn MailProvider>;
    fn calendar(&self, access_token: &str) -> Arc<dyn CalendarProvider>;
}

/// Live factory over the Google REST APIs.
pub struct LiveGoogleApis {
    http: reqwest::Client,
}

impl LiveGoogleApis {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl GoogleApis for LiveGoogleApis {
    fn mail(&self, access_token: &str) -> Arc<dyn MailProvider> {
        Arc::new(crate::mail::GmailClient::new(
            self.http.clone(),
            access_token,
        ))
    }

    fn calendar(&self, access_token: &str) -> Arc<dyn CalendarProvider> {
        Arc::new(crate::calendar::GoogleCalendarClient::new(
            self.http.clone(),
            access_token,
        ))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn CompletionProvider>,
    pub google: Arc<dyn GoogleApis>,
    pub voice: Arc<dyn crate::call::VoiceProvider>,
    pub oauth: Arc<OAuthFlow>,
    pub sessions: Arc<SessionStore>,
    pub calls: Arc<CallStore>,
}

/// Build the application router.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/status", get(auth_status))
        .route("/auth/google", get(auth_google))
        .route("/auth/google/callback", get(auth_callback))
        .route("/prepare-lookup", post(prepare_lookup))
        .route("/prepare-scheduling", post(prepare_scheduling))
        .route("/get-email-details", post(get_email_details))
        .route("/initiate-call", post(initiate_call))
        .route("/call-webhook", post(call_webhook))
        .route("/get-status/{call_id}", get(get_status))
        .route("/get-summary/{call_id}", get(get_summary))
        .with_state(state)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

/// Resolve the session cookie to stored tokens, or a 401 response.
async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<GoogleTokens, Response> {
    let Some(id) = session_id_from_headers(headers) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "User not authenticated.",
        ));
    };
    state.sessions.get(&id).await.ok_or_else(|| {
        error_response(StatusCode::UNAUTHORIZED, "User not authenticated.")
    })
}

// ── Health & auth ───────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "timely-agent"}))
}

async fn auth_status(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let authenticated = match session_id_from_headers(&headers) {
        Some(id) => state.sessions.contains(&id).await,
        None => false,
    };
    Json(serde_json::json!({"authenticated": authenticated}))
}

async fn auth_google(State(state): State<AppState>) -> impl IntoResponse {
    Redirect::temporary(&state.oauth.authorize_url())
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
}

async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code else {
        return error_response(StatusCode::BAD_REQUEST, "Missing authorization code.");
    };

    match state.oauth.exchange_code(&code).await {
        Ok(tokens) => {
            let id = state.sessions.insert(tokens).await;
            info!("OAuth session established");
            ([(SET_COOKIE, session_cookie(id))], Redirect::to("/")).into_response()
        }
        Err(e) => {
            error!(error = %e, "OAuth code exchange failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error during authentication.",
            )
        }
    }
}

// ── Lookup & scheduling ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareLookupRequest {
    user_request: String,
}

async fn prepare_lookup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PrepareLookupRequest>,
) -> Response {
    let tokens = match require_session(&state, &headers).await {
        Ok(tokens) => tokens,
        Err(response) => return response,
    };

    let mail = state.google.mail(&tokens.access_token);
    let pipeline = LookupPipeline::new(Arc::clone(&state.llm), mail);

    let vendor = match pipeline.derive_vendor(&body.user_request).await {
        Ok(vendor) => vendor,
        Err(e) => {
            error!(error = %e, "Vendor derivation failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to prepare lookup.",
            );
        }
    };

    match pipeline.find_information(&vendor, &body.user_request).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            error!(error = %e, %vendor, "Lookup pipeline failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to prepare lookup.",
            )
        }
    }
}

async fn prepare_scheduling(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let tokens = match require_session(&state, &headers).await {
        Ok(tokens) => tokens,
        Err(response) => return response,
    };

    let calendar = state.google.calendar(&tokens.access_token);
    // Availability fetch failures degrade to an open calendar rather than
    // failing the preparation step.
    let time_zone = calendar.timezone().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to fetch calendar timezone");
        None
    });
    let busy = calendar.free_busy().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to fetch calendar availability");
        Vec::new()
    });

    let context = format_busy_slots(&busy, time_zone.as_deref());
    Json(serde_json::json!({"taskType": "scheduling", "context": context})).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailDetailsRequest {
    message_id: String,
    user_request: String,
}

async fn get_email_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EmailDetailsRequest>,
) -> Response {
    let tokens = match require_session(&state, &headers).await {
        Ok(tokens) => tokens,
        Err(response) => return response,
    };

    let mail = state.google.mail(&tokens.access_token);
    let extractor = DetailExtractor::new(Arc::clone(&state.llm), mail);

    match extractor
        .email_details(&body.message_id, &body.user_request)
        .await
    {
        Ok(details) => Json(details).into_response(),
        Err(e) => {
            error!(error = %e, message_id = %body.message_id, "Detail extraction failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get email details.",
            )
        }
    }
}

// ── Call placement & polling ────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateCallRequest {
    user_name: String,
    user_request: String,
    phone_number: String,
    #[serde(default)]
    context: serde_json::Value,
    #[serde(default)]
    task_type: Option<String>,
}

impl InitiateCallRequest {
    /// The front end sends the accumulated context as either a plain string
    /// or a structured object.
    fn context_text(&self) -> String {
        match &self.context {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

async fn initiate_call(
    State(state): State<AppState>,
    Json(body): Json<InitiateCallRequest>,
) -> Response {
    let orchestrator = CallOrchestrator::new(
        Arc::clone(&state.llm),
        Arc::clone(&state.voice),
        Arc::clone(&state.calls),
    );

    match orchestrator
        .initiate(
            &body.user_name,
            &body.user_request,
            &body.phone_number,
            &body.context_text(),
            body.task_type.as_deref(),
        )
        .await
    {
        Ok(call_id) => Json(serde_json::json!({
            "message": "Call initiated successfully!",
            "callId": call_id,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Call initiation failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to initiate call.",
            )
        }
    }
}

/// Vendor-pushed call event. Field names vary between event types, so the
/// id accepts the aliases the vendor is known to use.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(alias = "call_id", alias = "conversationId", alias = "conversation_id")]
    call_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    transcript: Option<TranscriptPayload>,
}

/// Transcripts arrive either as flat text or as role/message entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranscriptPayload {
    Text(String),
    Entries(Vec<TranscriptEntry>),
}

#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    role: String,
    message: String,
}

impl TranscriptPayload {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Entries(entries) => entries
                .into_iter()
                .map(|e| format!("{}: {}", e.role, e.message))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

async fn call_webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> impl IntoResponse {
    if let Some(status) = &event.status {
        state.calls.update_status(&event.call_id, status).await;
    }
    if let Some(transcript) = event.transcript {
        state
            .calls
            .set_transcript(&event.call_id, transcript.into_text())
            .await;
    }
    StatusCode::OK
}

async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(call_id): Path<String>,
) -> Response {
    if let Err(response) = require_session(&state, &headers).await {
        return response;
    }

    match state.calls.status(&call_id).await {
        Some(status) => Json(serde_json::json!({
            "callId": call_id,
            "status": status,
        }))
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No call session found."),
    }
}

async fn get_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(call_id): Path<String>,
) -> Response {
    let tokens = match require_session(&state, &headers).await {
        Ok(tokens) => tokens,
        Err(response) => return response,
    };

    let transcript = match state.calls.take_transcript(&call_id).await {
        SummaryReadiness::Ready(transcript) => transcript,
        SummaryReadiness::Pending(_) | SummaryReadiness::Unknown => {
            return (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "status": "processing",
                    "message": "Conversation is still in progress",
                })),
            )
                .into_response();
        }
    };

    let calendar = state.google.calendar(&tokens.access_token);
    let time_zone = calendar.timezone().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to fetch calendar timezone for summary");
        None
    });

    let summary = match generate_summary(state.llm.as_ref(), &transcript, time_zone.as_deref())
        .await
    {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, %call_id, "Summary generation failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch conversation summary.",
            );
        }
    };

    if let Some(action) = &summary.next_action
        && action.is_calendar_event()
    {
        info!(%call_id, "Follow-up action detected: creating calendar event");
        match calendar.insert_event(&action.event).await {
            Ok(link) => info!(%link, "Calendar event created"),
            Err(e) => error!(error = %e, "Failed to create calendar event"),
        }
    }

    Json(serde_json::json!({"summary": summary.display_text()})).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_event_accepts_id_aliases() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "conversation_id": "conv-1",
            "status": "in-progress"
        }))
        .unwrap();
        assert_eq!(event.call_id, "conv-1");
        assert_eq!(event.status.as_deref(), Some("in-progress"));
    }

    #[test]
    fn webhook_transcript_entries_flatten_to_text() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "callId": "conv-2",
            "transcript": [
                {"role": "agent", "message": "Hello"},
                {"role": "user", "message": "Hi there"}
            ]
        }))
        .unwrap();
        assert_eq!(
            event.transcript.unwrap().into_text(),
            "agent: Hello\nuser: Hi there"
        );
    }

    #[test]
    fn webhook_transcript_accepts_flat_text() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "callId": "conv-3",
            "transcript": "agent: Hello"
        }))
        .unwrap();
        assert_eq!(event.transcript.unwrap().into_text(), "agent: Hello");
    }

    #[test]
    fn initiate_request_context_accepts_string_or_object() {
        let req: InitiateCallRequest = serde_json::from_value(serde_json::json!({
            "userName": "Jordan",
            "userRequest": "book a table",
            "phoneNumber": "+15550001111",
            "context": {"order": "A-1"}
        }))
        .unwrap();
        assert_eq!(req.context_text(), r#"{"order":"A-1"}"#);

        let req: InitiateCallRequest = serde_json::from_value(serde_json::json!({
            "userName": "Jordan",
            "userRequest": "book a table",
            "phoneNumber": "+15550001111",
            "context": "plain context"
        }))
        .unwrap();
        assert_eq!(req.context_text(), "plain context");

        let req: InitiateCallRequest = serde_json::from_value(serde_json::json!({
            "userName": "Jordan",
            "userRequest": "book a table",
            "phoneNumber": "+15550001111"
        }))
        .unwrap();
        assert_eq!(req.context_text(), "");
    }
}
