//! Google OAuth2 authorization-code flow and the in-memory session store.
//!
//! Sessions are process-local and reset on restart, like the rest of the
//! service's state. The session id is an unguessable random UUID carried
//! in an HttpOnly cookie.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AuthError, ConfigError};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "timely_session";

/// Google OAuth endpoints.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes: read-only mail, calendar events + settings.
const SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/calendar.settings.readonly",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// Tokens returned by the authorization-code exchange.
#[derive(Debug, Clone)]
pub struct GoogleTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// In-memory session store keyed by cookie UUID.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, GoogleTokens>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Store tokens, returning the new session id.
    pub async fn insert(&self, tokens: GoogleTokens) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, tokens);
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<GoogleTokens> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.sessions.read().await.contains_key(id)
    }
}

/// Pull the session id out of a request's Cookie header.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == SESSION_COOKIE {
            Uuid::parse_str(value.trim()).ok()
        } else {
            None
        }
    })
}

/// Build the Set-Cookie value for a freshly created session.
pub fn session_cookie(id: Uuid) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

/// Google authorization-code flow.
pub struct OAuthFlow {
    client: BasicClient,
}

impl OAuthFlow {
    /// Configure the flow; the redirect URI is derived from the public base
    /// URL.
    pub fn new(
        client_id: &str,
        client_secret: &SecretString,
        public_base_url: &str,
    ) -> Result<Self, ConfigError> {
        let auth_url = AuthUrl::new(GOOGLE_AUTH_URL.to_string())
            .map_err(|e| invalid("auth url", e))?;
        let token_url = TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
            .map_err(|e| invalid("token url", e))?;
        let redirect_url = RedirectUrl::new(format!("{public_base_url}/auth/google/callback"))
            .map_err(|e| invalid("PUBLIC_BASE_URL", e))?;

        let client = BasicClient::new(
            ClientId::new(client_id.to_string()),
            Some(ClientSecret::new(client_secret.expose_secret().to_string())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(Self { client })
    }

    /// Consent-screen URL with our scopes and offline access.
    pub fn authorize_url(&self) -> String {
        let mut request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("access_type", "offline");
        for scope in SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, _csrf) = request.url();
        url.to_string()
    }

    /// Exchange the callback code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokens, AuthError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let expires_at = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        Ok(GoogleTokens {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_at,
        })
    }
}

fn invalid(key: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: err.to_string(),
    }
}
