pub mod calendar;
pub mod chat;
pub mod health;
pub mod sessions;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// An empty expected key leaves the API open.
fn check_api_key(headers: &HeaderMap, expected_key: &str) -> Result<(), AppError> {
    if expected_key.is_empty() {
        return Ok(());
    }

    let key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if key != expected_key {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
