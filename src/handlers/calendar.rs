use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::check_api_key;
use crate::errors::AppError;
use crate::models::{CalendarEvent, CalendarStats};
use crate::state::AppState;

const MAX_LIMIT: usize = 250;

// GET /api/v1/meetings
#[derive(Deserialize)]
pub struct MeetingsQuery {
    pub limit: Option<usize>,
    pub days_ahead: Option<u32>,
}

pub async fn list_meetings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MeetingsQuery>,
) -> Result<Json<Vec<CalendarEvent>>, AppError> {
    check_api_key(&headers, &state.config.api_key)?;

    let limit = query.limit.unwrap_or(10).clamp(1, MAX_LIMIT);
    let days_ahead = query.days_ahead.unwrap_or(30);
    let events = state
        .calendar
        .get_upcoming_events(Utc::now(), limit, days_ahead)
        .await;
    Ok(Json(events))
}

// GET /api/v1/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CalendarStats>, AppError> {
    check_api_key(&headers, &state.config.api_key)?;

    let tz = state.config.context_defaults()?.timezone;
    let stats = state.calendar.stats(&Utc::now().with_timezone(&tz)).await;
    Ok(Json(stats))
}
