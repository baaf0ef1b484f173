use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use chrono::TimeDelta;
use tokio::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use booking_assistant::config::AppConfig;
use booking_assistant::handlers;
use booking_assistant::services::ai::ollama::OllamaProvider;
use booking_assistant::services::ai::openai::OpenAiCompatibleProvider;
use booking_assistant::services::ai::LlmProvider;
use booking_assistant::services::calendar::google::GoogleCalendar;
use booking_assistant::services::calendar::memory::InMemoryCalendar;
use booking_assistant::services::calendar::{CalendarBackend, CalendarService};
use booking_assistant::services::conversation::Assistant;
use booking_assistant::services::rate_limit::RateLimiter;
use booking_assistant::services::sessions::SessionStore;
use booking_assistant::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let defaults = config.context_defaults()?;

    let llm: Arc<dyn LlmProvider> = match config.llm_provider.as_str() {
        "ollama" => {
            tracing::info!("using Ollama LLM provider (url: {}, model: {})", config.ollama_url, config.ollama_model);
            Arc::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
                config.llm_temperature,
            ))
        }
        _ => {
            anyhow::ensure!(!config.llm_api_key.is_empty(), "LLM_API_KEY must be set when LLM_PROVIDER=openai");
            tracing::info!("using OpenAI-compatible LLM provider (base: {}, model: {})", config.llm_base_url, config.llm_model);
            Arc::new(OpenAiCompatibleProvider::new(
                config.llm_base_url.clone(),
                config.llm_api_key.clone(),
                config.llm_model.clone(),
                config.llm_temperature,
            ))
        }
    };

    let backend: Box<dyn CalendarBackend> = match config.calendar_backend.as_str() {
        "google" => {
            anyhow::ensure!(
                !config.google_access_token.is_empty(),
                "GOOGLE_ACCESS_TOKEN must be set when CALENDAR_BACKEND=google"
            );
            tracing::info!("using Google Calendar backend (calendar: {})", config.google_calendar_id);
            Box::new(GoogleCalendar::new(
                config.google_calendar_id.clone(),
                config.google_access_token.clone(),
            ))
        }
        _ => {
            tracing::info!("using in-memory calendar backend");
            Box::new(InMemoryCalendar::new())
        }
    };

    let calendar = Arc::new(CalendarService::new(
        backend,
        Duration::from_secs(config.calendar_cache_ttl_secs),
        Duration::from_millis(config.calendar_min_interval_ms),
    ));

    let state = Arc::new(AppState {
        assistant: Assistant::new(llm, calendar.clone()).with_rephrasing(config.rephrase_responses),
        calendar,
        sessions: SessionStore::new(defaults, TimeDelta::minutes(config.session_idle_minutes)),
        limiter: RateLimiter::new(config.rate_limit_per_minute),
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-api-key")]);

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/chat", post(handlers::chat::chat))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route(
            "/api/v1/sessions/:id/preferences",
            post(handlers::sessions::update_preferences),
        )
        .route("/api/v1/meetings", get(handlers::calendar::list_meetings))
        .route("/api/v1/stats", get(handlers::calendar::stats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
