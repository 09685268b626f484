//! In-memory call session store, keyed by call id.
//!
//! Sessions are created when a call is placed, mutated by webhook events,
//! and deleted when their summary is delivered (at-most-once read). A TTL
//! sweep evicts sessions whose summary is never polled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// State of one outbound call.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: String,
    /// Latest vendor-pushed status text.
    pub status: String,
    /// Transcript delivered by the end-of-call event, if any.
    pub transcript: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallSession {
    fn new(call_id: &str, status: &str) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.to_string(),
            status: status.to_string(),
            transcript: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What the summary poller finds for a call id.
#[derive(Debug)]
pub enum SummaryReadiness {
    /// No session — never created, already delivered, or evicted.
    Unknown,
    /// Session exists but the transcript has not arrived.
    Pending(String),
    /// Transcript ready; the session has been removed.
    Ready(String),
}

/// Keyed store for call sessions with TTL eviction.
pub struct CallStore {
    sessions: RwLock<HashMap<String, CallSession>>,
    ttl: Duration,
}

impl CallStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    /// Register a freshly placed call.
    pub async fn insert(&self, call_id: &str, status: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(call_id.to_string(), CallSession::new(call_id, status));
        info!(%call_id, %status, "Call session created");
    }

    /// Record a vendor status event. Creates the session if the webhook
    /// beat the insert.
    pub async fn update_status(&self, call_id: &str, status: &str) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(call_id.to_string())
            .or_insert_with(|| CallSession::new(call_id, status));
        session.status = status.to_string();
        session.updated_at = Utc::now();
        debug!(%call_id, %status, "Call status updated");
    }

    /// Attach the end-of-call transcript.
    pub async fn set_transcript(&self, call_id: &str, transcript: String) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(call_id.to_string())
            .or_insert_with(|| CallSession::new(call_id, "ended"));
        session.transcript = Some(transcript);
        session.updated_at = Utc::now();
        info!(%call_id, "Call transcript stored");
    }

    /// Latest status for a call, if the session exists.
    pub async fn status(&self, call_id: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions.get(call_id).map(|s| s.status.clone())
    }

    /// Consume the transcript for summary delivery.
    ///
    /// When the transcript is present the whole session is removed, so a
    /// second poll observes `Unknown` — at-most-once delivery.
    pub async fn take_transcript(&self, call_id: &str) -> SummaryReadiness {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get(call_id) else {
            return SummaryReadiness::Unknown;
        };
        if session.transcript.is_none() {
            return SummaryReadiness::Pending(session.status.clone());
        }
        let transcript = sessions
            .remove(call_id)
            .and_then(|s| s.transcript)
            .unwrap_or_default();
        info!(%call_id, "Call transcript consumed, session removed");
        SummaryReadiness::Ready(transcript)
    }

    /// Drop sessions idle past the TTL. Returns how many were evicted.
    pub async fn evict_stale(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.updated_at > cutoff);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, "Evicted stale call sessions");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Spawn a background task that periodically evicts stale sessions.
pub fn spawn_eviction_task(store: Arc<CallStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            store.evict_stale().await;
        }
    })
}
