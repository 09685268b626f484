//! Integration tests for the HTTP surface.
//!
//! Each test spins up an Axum server on a random port with stubbed vendor
//! providers and exercises the real REST contract with reqwest.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;
use tokio::net::TcpListener;

use timely_agent::auth::{GoogleTokens, OAuthFlow, SessionStore, session_cookie};
use timely_agent::calendar::{BusySlot, CalendarProvider, EventDetails};
use timely_agent::call::telephony::{CallRequest, VoiceProvider};
use timely_agent::call::CallStore;
use timely_agent::error::{CalendarError, CallError, LlmError, MailError};
use timely_agent::llm::CompletionProvider;
use timely_agent::mail::{EmailMessage, Header, MailProvider, MessagePart, MessageRef, PartBody};
use timely_agent::routes::{AppState, GoogleApis, app_routes};

// ── Stub providers ──────────────────────────────────────────────────

/// Completion stub — dispatches on prompt markers the way the real
/// prompts are phrased.
struct StubLlm;

#[async_trait]
impl CompletionProvider for StubLlm {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        if prompt.contains("primary brand or company name") {
            Ok("Acme".into())
        } else if prompt.contains("relevance detection assistant") {
            if prompt.contains("TRANSACTIONAL") {
                Ok("Relevant".into())
            } else {
                Ok("Irrelevant".into())
            }
        } else if prompt.contains("what information would an assistant need") {
            Ok("order number, store phone number".into())
        } else if prompt.contains("expert information extractor") {
            Ok("```json\n{\"order_number\": \"A-1\"}\n```".into())
        } else if prompt.contains("E.164") {
            Ok("+15551230000".into())
        } else if prompt.contains("likely job title") {
            Ok("Receptionist".into())
        } else if prompt.contains("post-call analysis expert") {
            Ok(r#"{"summary": "Called the store about the order.", "result": "Refund issued.", "followUp": false}"#.into())
        } else {
            Ok("ok".into())
        }
    }
}

struct StubMail;

fn make_message(id: &str, subject: &str, body: &str) -> EmailMessage {
    EmailMessage {
        id: id.into(),
        snippet: String::new(),
        payload: MessagePart {
            mime_type: Some("text/plain".into()),
            headers: vec![
                Header {
                    name: "Subject".into(),
                    value: subject.into(),
                },
                Header {
                    name: "Date".into(),
                    value: "Mon, 2 Mar 2026 10:00:00 +0000".into(),
                },
            ],
            body: Some(PartBody {
                data: Some(URL_SAFE_NO_PAD.encode(body)),
                attachment_id: None,
            }),
            ..Default::default()
        },
    }
}

#[async_trait]
impl MailProvider for StubMail {
    async fn list_messages(
        &self,
        _query: &str,
        _max_results: u32,
    ) -> Result<Vec<MessageRef>, MailError> {
        Ok(vec![
            MessageRef { id: "m1".into() },
            MessageRef { id: "m2".into() },
        ])
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage, MailError> {
        match id {
            "m1" => Ok(make_message(
                "m1",
                "Weekly deals from Acme",
                "marketing blast",
            )),
            "m2" => Ok(make_message(
                "m2",
                "Order Confirmation #42",
                "TRANSACTIONAL order details",
            )),
            other => Err(MailError::Request(format!("no such message: {other}"))),
        }
    }

    async fn get_attachment(
        &self,
        _message_id: &str,
        _attachment_id: &str,
    ) -> Result<Vec<u8>, MailError> {
        Err(MailError::Request("no attachments".into()))
    }
}

struct StubCalendar;

#[async_trait]
impl CalendarProvider for StubCalendar {
    async fn free_busy(&self) -> Result<Vec<BusySlot>, CalendarError> {
        Ok(Vec::new())
    }

    async fn timezone(&self) -> Result<Option<String>, CalendarError> {
        Ok(Some("America/New_York".into()))
    }

    async fn insert_event(&self, _event: &EventDetails) -> Result<String, CalendarError> {
        Ok("https://calendar.example.com/event/1".into())
    }
}

struct StubGoogle;

impl GoogleApis for StubGoogle {
    fn mail(&self, _access_token: &str) -> Arc<dyn MailProvider> {
        Arc::new(StubMail)
    }

    fn calendar(&self, _access_token: &str) -> Arc<dyn CalendarProvider> {
        Arc::new(StubCalendar)
    }
}

struct StubVoice;

#[async_trait]
impl VoiceProvider for StubVoice {
    async fn place_call(&self, _request: &CallRequest) -> Result<String, CallError> {
        Ok("conv-test-1".into())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

/// Start the app on a random port; returns the base URL and a valid
/// session cookie.
async fn spawn_app() -> (String, String) {
    let sessions = SessionStore::new();
    let session_id = sessions
        .insert(GoogleTokens {
            access_token: "test-access-token".into(),
            refresh_token: None,
            expires_at: None,
        })
        .await;

    let oauth = OAuthFlow::new(
        "test-client-id",
        &SecretString::from("test-secret"),
        "http://localhost:3000",
    )
    .expect("oauth flow");

    let state = AppState {
        llm: Arc::new(StubLlm),
        google: Arc::new(StubGoogle),
        voice: Arc::new(StubVoice),
        oauth: Arc::new(oauth),
        sessions,
        calls: CallStore::new(std::time::Duration::from_secs(3600)),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app_routes(state)).await.ok();
    });

    (format!("http://{addr}"), session_cookie(session_id))
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint_responds() {
    let (base, _cookie) = spawn_app().await;
    let response = client().get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn lookup_requires_authentication() {
    let (base, _cookie) = spawn_app().await;
    let response = client()
        .post(format!("{base}/prepare-lookup"))
        .json(&serde_json::json!({"userRequest": "find my Acme order"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "User not authenticated.");
}

#[tokio::test]
async fn auth_status_reflects_session_cookie() {
    let (base, cookie) = spawn_app().await;

    let anonymous: serde_json::Value = client()
        .get(format!("{base}/auth/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(anonymous["authenticated"], false);

    let authed: serde_json::Value = client()
        .get(format!("{base}/auth/status"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(authed["authenticated"], true);
}

#[tokio::test]
async fn prepare_lookup_ranks_transactional_mail() {
    let (base, cookie) = spawn_app().await;
    let response = client()
        .post(format!("{base}/prepare-lookup"))
        .header("Cookie", &cookie)
        .json(&serde_json::json!({"userRequest": "find my Acme order"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["needsSelection"], true);
    let choices = body["choices"].as_array().unwrap();
    assert_eq!(choices.len(), 1);
    assert_eq!(choices[0]["id"], "m2");
    assert!(
        choices[0]["text"]
            .as_str()
            .unwrap()
            .contains("Order Confirmation #42")
    );
}

#[tokio::test]
async fn email_details_extract_fields_and_phone() {
    let (base, cookie) = spawn_app().await;
    let response = client()
        .post(format!("{base}/get-email-details"))
        .header("Cookie", &cookie)
        .json(&serde_json::json!({
            "messageId": "m2",
            "userRequest": "find my Acme order"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["context"]["order_number"], "A-1");
    assert_eq!(body["phoneNumberFromEmail"], "+15551230000");
}

#[tokio::test]
async fn prepare_scheduling_reports_open_calendar() {
    let (base, cookie) = spawn_app().await;
    let response = client()
        .post(format!("{base}/prepare-scheduling"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["taskType"], "scheduling");
    assert!(
        body["context"]
            .as_str()
            .unwrap()
            .contains("completely open")
    );
}

#[tokio::test]
async fn initiate_call_registers_pollable_session() {
    let (base, cookie) = spawn_app().await;

    let response = client()
        .post(format!("{base}/initiate-call"))
        .json(&serde_json::json!({
            "userName": "Jordan",
            "userRequest": "ask about my order",
            "phoneNumber": "+15550001111",
            "context": "Order A-1",
            "taskType": "lookup"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["callId"], "conv-test-1");

    let status: serde_json::Value = client()
        .get(format!("{base}/get-status/conv-test-1"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "initiated");
}

#[tokio::test]
async fn webhook_updates_call_status() {
    let (base, cookie) = spawn_app().await;

    client()
        .post(format!("{base}/call-webhook"))
        .json(&serde_json::json!({"callId": "conv-9", "status": "in-progress"}))
        .send()
        .await
        .unwrap();

    let status: serde_json::Value = client()
        .get(format!("{base}/get-status/conv-9"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "in-progress");
}

#[tokio::test]
async fn unknown_call_status_is_404() {
    let (base, cookie) = spawn_app().await;
    let response = client()
        .get(format!("{base}/get-status/never-existed"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn summary_is_delivered_exactly_once() {
    let (base, cookie) = spawn_app().await;

    // No transcript yet → 202.
    client()
        .post(format!("{base}/call-webhook"))
        .json(&serde_json::json!({"callId": "conv-5", "status": "in-progress"}))
        .send()
        .await
        .unwrap();
    let pending = client()
        .get(format!("{base}/get-summary/conv-5"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(pending.status(), 202);

    // End-of-call event with transcript entries.
    client()
        .post(format!("{base}/call-webhook"))
        .json(&serde_json::json!({
            "callId": "conv-5",
            "status": "ended",
            "transcript": [
                {"role": "agent", "message": "Hi, calling about order A-1."},
                {"role": "user", "message": "Refund is on the way."}
            ]
        }))
        .send()
        .await
        .unwrap();

    let ready = client()
        .get(format!("{base}/get-summary/conv-5"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(ready.status(), 200);
    let body: serde_json::Value = ready.json().await.unwrap();
    let text = body["summary"].as_str().unwrap();
    assert!(text.contains("**Summary:**"));
    assert!(text.contains("Refund issued."));

    // Second read: the session was consumed, so it's "not ready" again.
    let second = client()
        .get(format!("{base}/get-summary/conv-5"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 202);
}

#[tokio::test]
async fn summary_requires_authentication() {
    let (base, _cookie) = spawn_app().await;
    let response = client()
        .get(format!("{base}/get-summary/conv-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}
