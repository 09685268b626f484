use std::sync::Arc;

use timely_agent::auth::{OAuthFlow, SessionStore};
use timely_agent::call::{CallStore, spawn_eviction_task};
use timely_agent::call::telephony::ElevenLabsClient;
use timely_agent::config::Config;
use timely_agent::llm::LlamaClient;
use timely_agent::routes::{AppState, LiveGoogleApis, app_routes};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Set the completion, Google, and telephony credentials before starting.");
        std::process::exit(1);
    });

    eprintln!("📞 Timely Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llama_model);
    eprintln!("   Base URL: {}", config.public_base_url);
    eprintln!("   API: http://0.0.0.0:{}\n", config.port);

    let http = reqwest::Client::new();

    let llm = Arc::new(LlamaClient::new(
        http.clone(),
        config.llama_api_url.clone(),
        config.llama_api_key.clone(),
        config.llama_model.clone(),
        config.llama_token_budget,
    ));

    let oauth = Arc::new(OAuthFlow::new(
        &config.google_client_id,
        &config.google_client_secret,
        &config.public_base_url,
    )?);

    let voice = Arc::new(ElevenLabsClient::new(
        http.clone(),
        config.elevenlabs_api_key.clone(),
        config.elevenlabs_agent_id.clone(),
        config.elevenlabs_phone_number_id.clone(),
    ));

    let sessions = SessionStore::new();
    let calls = CallStore::new(config.call_session_ttl);

    // Sweep call sessions whose summary is never polled.
    let _eviction_handle = spawn_eviction_task(Arc::clone(&calls));

    let state = AppState {
        llm,
        google: Arc::new(LiveGoogleApis::new(http)),
        voice,
        oauth,
        sessions,
        calls,
    };

    let app = app_routes(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Server started");
    axum::serve(listener, app).await?;

    Ok(())
}
