use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::calendar::CalendarService;
use crate::services::conversation::Assistant;
use crate::services::rate_limit::RateLimiter;
use crate::services::sessions::SessionStore;

pub struct AppState {
    pub config: AppConfig,
    pub assistant: Assistant,
    pub calendar: Arc<CalendarService>,
    pub sessions: SessionStore,
    pub limiter: RateLimiter,
}
