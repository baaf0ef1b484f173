use std::env;

use chrono_tz::Tz;

use crate::errors::AppError;
use crate::models::{BusinessHours, ContextDefaults};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub llm_provider: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub ollama_url: String,
    pub ollama_model: String,
    pub calendar_backend: String,
    pub google_calendar_id: String,
    pub google_access_token: String,
    pub default_timezone: String,
    pub business_hours_start: String,
    pub business_hours_end: String,
    pub default_duration_minutes: u32,
    pub calendar_cache_ttl_secs: u64,
    pub calendar_min_interval_ms: u64,
    pub rate_limit_per_minute: usize,
    pub session_idle_minutes: i64,
    pub api_key: String,
    pub cors_origin: String,
    pub rephrase_responses: bool,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 8000),
            llm_provider: string("LLM_PROVIDER", "openai").to_lowercase(),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_base_url: string("LLM_BASE_URL", "https://openrouter.ai/api/v1"),
            llm_model: string("LLM_MODEL", "deepseek/deepseek-r1:free"),
            llm_temperature: parsed("LLM_TEMPERATURE", 0.3),
            ollama_url: string("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: string("OLLAMA_MODEL", "llama3.2"),
            calendar_backend: string("CALENDAR_BACKEND", "memory").to_lowercase(),
            google_calendar_id: string("GOOGLE_CALENDAR_ID", "primary"),
            google_access_token: env::var("GOOGLE_ACCESS_TOKEN").unwrap_or_default(),
            default_timezone: string("DEFAULT_TIMEZONE", "Asia/Kolkata"),
            business_hours_start: string("BUSINESS_HOURS_START", "09:00"),
            business_hours_end: string("BUSINESS_HOURS_END", "17:00"),
            default_duration_minutes: parsed("DEFAULT_DURATION_MINUTES", 60),
            calendar_cache_ttl_secs: parsed("CALENDAR_CACHE_TTL_SECS", 300),
            calendar_min_interval_ms: parsed("CALENDAR_MIN_INTERVAL_MS", 100),
            rate_limit_per_minute: parsed("RATE_LIMIT_PER_MINUTE", 60),
            session_idle_minutes: parsed("SESSION_IDLE_MINUTES", 30),
            api_key: env::var("API_KEY").unwrap_or_default(),
            cors_origin: string("CORS_ORIGIN", "http://localhost:8501"),
            rephrase_responses: parsed("REPHRASE_RESPONSES", false),
        }
    }

    /// Preferences new sessions start with. Fails on an unknown zone or bad hours.
    pub fn context_defaults(&self) -> Result<ContextDefaults, AppError> {
        let timezone: Tz = self.default_timezone.trim().parse().map_err(|e| {
            AppError::Config(format!("DEFAULT_TIMEZONE {}: {e}", self.default_timezone))
        })?;
        let business_hours = BusinessHours::parse(&self.business_hours_start, &self.business_hours_end)
            .map_err(|e| AppError::Config(format!("business hours: {e}")))?;
        if self.default_duration_minutes == 0 {
            return Err(AppError::Config(
                "DEFAULT_DURATION_MINUTES must be positive".to_string(),
            ));
        }

        Ok(ContextDefaults {
            timezone,
            business_hours,
            default_duration: self.default_duration_minutes,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            llm_provider: "openai".to_string(),
            llm_api_key: String::new(),
            llm_base_url: "https://openrouter.ai/api/v1".to_string(),
            llm_model: "deepseek/deepseek-r1:free".to_string(),
            llm_temperature: 0.3,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            calendar_backend: "memory".to_string(),
            google_calendar_id: "primary".to_string(),
            google_access_token: String::new(),
            default_timezone: "Asia/Kolkata".to_string(),
            business_hours_start: "09:00".to_string(),
            business_hours_end: "17:00".to_string(),
            default_duration_minutes: 60,
            calendar_cache_ttl_secs: 300,
            calendar_min_interval_ms: 100,
            rate_limit_per_minute: 60,
            session_idle_minutes: 30,
            api_key: String::new(),
            cors_origin: "http://localhost:8501".to_string(),
            rephrase_responses: false,
        }
    }
}
