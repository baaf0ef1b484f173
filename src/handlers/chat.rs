use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::check_api_key;
use crate::errors::AppError;
use crate::models::ContextSummary;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    session_id: String,
    reply: String,
    summary: ContextSummary,
}

// POST /api/v1/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    check_api_key(&headers, &state.config.api_key)?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let session_id = request
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if !state.limiter.allow(&session_id) {
        return Err(AppError::RateLimited(format!(
            "too many messages for session {session_id}, try again in a minute"
        )));
    }

    tracing::info!(session = %session_id, "incoming chat message");

    let context = state.sessions.get_or_create(&session_id);
    let (reply, summary) = {
        let mut ctx = context.lock().await;
        let reply = state.assistant.handle_turn(&mut ctx, message).await;
        (reply, ctx.summary())
    };

    state.sessions.expire_idle(Utc::now());
    state.limiter.retain_recent();
    state.calendar.cleanup_expired();

    Ok(Json(ChatResponse {
        session_id,
        reply,
        summary,
    }))
}
