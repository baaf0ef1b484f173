use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::check_api_key;
use crate::errors::AppError;
use crate::models::{BusinessHours, ContextSummary};
use crate::state::AppState;

// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ContextSummary>, AppError> {
    check_api_key(&headers, &state.config.api_key)?;

    let context = state
        .sessions
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("session {id}")))?;
    let summary = context.lock().await.summary();
    Ok(Json(summary))
}

// POST /api/v1/sessions/:id/preferences
#[derive(Deserialize)]
pub struct PreferencesRequest {
    pub timezone: Option<String>,
    pub business_hours_start: Option<String>,
    pub business_hours_end: Option<String>,
    pub default_duration: Option<u32>,
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PreferencesRequest>,
) -> Result<Json<ContextSummary>, AppError> {
    check_api_key(&headers, &state.config.api_key)?;

    let business_hours = match (&request.business_hours_start, &request.business_hours_end) {
        (Some(start), Some(end)) => Some(
            BusinessHours::parse(start, end).map_err(|e| AppError::BadRequest(e.to_string()))?,
        ),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "business_hours_start and business_hours_end must be given together".to_string(),
            ))
        }
    };
    if request.default_duration == Some(0) {
        return Err(AppError::BadRequest(
            "default_duration must be positive".to_string(),
        ));
    }

    let context = state.sessions.get_or_create(&id);
    let mut ctx = context.lock().await;
    if let Some(timezone) = &request.timezone {
        ctx.set_timezone(timezone)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
    }
    if let Some(hours) = business_hours {
        ctx.set_business_hours(hours);
    }
    if let Some(minutes) = request.default_duration {
        ctx.set_default_duration(minutes)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
    }

    tracing::info!(session = %id, "preferences updated");
    Ok(Json(ctx.summary()))
}

// DELETE /api/v1/sessions/:id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    check_api_key(&headers, &state.config.api_key)?;

    state.sessions.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}
