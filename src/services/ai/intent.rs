//! Intent classification and booking-field extraction backed by the oracle.
//!
//! Oracle output is untrusted free text. Nothing it returns reaches the
//! dialogue unless it passes `parse_extraction`; every failure falls back to
//! a safe default (`Intent::Unclear`) or to deterministic extraction.

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::models::{
    ConversationContext, Flexibility, Intent, MeetingType, ParsedBookingRequest, Reply, Urgency,
};
use crate::services::ai::{LlmProvider, Message};
use crate::services::extraction::fallback_booking;

const INTENT_PROMPT: &str = r#"You are an expert at understanding user intentions for calendar booking requests.
Analyze the user's message and determine their intent.

Possible intents:
- book_meeting: User wants to schedule a new meeting
- check_availability: User wants to know available time slots
- reschedule_meeting: User wants to change an existing meeting
- cancel_meeting: User wants to cancel a meeting
- list_meetings: User wants to see their scheduled meetings
- greeting: User is greeting or making small talk
- unclear: Intent is not clear

Respond with just the intent name (e.g., "book_meeting")."#;

const EXTRACTION_PROMPT: &str = r#"Extract booking details from the user's message. Be intelligent about parsing times, dates, and contexts.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "summary": "meeting title/type",
  "start_time": "ISO 8601 datetime or null",
  "duration_minutes": 60,
  "attendees": ["email1", "email2"],
  "description": "additional details",
  "meeting_type": "meeting|call|appointment|interview|standup",
  "urgency": "low|normal|high|urgent",
  "flexibility": "rigid|flexible|very_flexible"
}

Time parsing rules:
- "tomorrow" = next day
- "next week" = same day next week
- "monday" = next occurrence of Monday
- "in 2 hours" = 2 hours from now
- "end of week" = Friday
- Handle AM/PM, 24-hour format, relative times

If the time is ambiguous, set start_time to null.
Use the default duration from the context unless one is specified."#;

const REPHRASE_PROMPT: &str = r#"You are a friendly, professional scheduling assistant. Rewrite the draft reply below so it reads naturally.

Rules:
- Keep every date, time, duration and list item exactly as written
- Do not invent meetings, times or outcomes
- Keep it concise
- Return only the reply text"#;

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "hi there",
    "hello there",
    "hey there",
    "good morning",
    "good afternoon",
    "good evening",
];

/// Canonical greetings never need the oracle.
pub fn is_canonical_greeting(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();
    GREETINGS.contains(&normalized.as_str())
}

pub async fn classify_intent(llm: &dyn LlmProvider, text: &str, context_summary: &str) -> Intent {
    if is_canonical_greeting(text) {
        return Intent::Greeting;
    }

    let message = Message::user(format!(
        "User message: {text}\nPrevious context: {context_summary}"
    ));

    match llm.chat(INTENT_PROMPT, &[message]).await {
        Ok(response) => {
            let token = strip_reasoning(&response);
            let intent = Intent::from_token(token);
            if intent == Intent::Unclear && !token.trim().eq_ignore_ascii_case("unclear") {
                tracing::warn!(response = %token, "unrecognized intent token, treating as unclear");
            }
            intent
        }
        Err(e) => {
            tracing::error!(error = %e, "intent classification failed");
            Intent::Unclear
        }
    }
}

pub async fn extract_booking_fields(
    llm: &dyn LlmProvider,
    text: &str,
    now: &DateTime<Tz>,
    ctx: &ConversationContext,
) -> ParsedBookingRequest {
    let message = Message::user(format!(
        "User message: {text}\nCurrent date/time: {}\nUser timezone: {}\nPrevious context: {}",
        now.to_rfc3339(),
        ctx.timezone.name(),
        ctx.extraction_prompt_context(),
    ));

    match llm.chat(EXTRACTION_PROMPT, &[message]).await {
        Ok(response) => match parse_extraction(&response, ctx) {
            Some(request) => request,
            None => {
                tracing::warn!("failed to parse oracle extraction, using deterministic fallback");
                fallback_booking(text, now, ctx)
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "booking extraction failed, using deterministic fallback");
            fallback_booking(text, now, ctx)
        }
    }
}

/// Rewords a deterministic reply. Any oracle trouble keeps the original text.
pub async fn rephrase(
    llm: &dyn LlmProvider,
    reply: &Reply,
    user_text: &str,
    ctx: &ConversationContext,
) -> String {
    // Earlier exchanges only; the current turn has no reply yet.
    let mut messages: Vec<Message> = ctx
        .recent_history(4)
        .into_iter()
        .filter_map(|entry| {
            let assistant = entry.assistant.as_deref()?;
            Some([Message::user(entry.user.as_str()), Message::assistant(assistant)])
        })
        .flatten()
        .collect();
    messages.push(Message::user(format!(
        "Situation: {}\nUser message: {user_text}\nDraft reply:\n{}\nUser timezone: {}\nBusiness hours: {}",
        reply.situation.as_str(),
        reply.text,
        ctx.timezone.name(),
        ctx.business_hours.to_human_readable(),
    )));

    match llm.chat(REPHRASE_PROMPT, &messages).await {
        Ok(response) => {
            let text = strip_reasoning(&response).trim();
            if text.is_empty() {
                reply.text.clone()
            } else {
                text.to_string()
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "reply rephrasing failed");
            reply.text.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    duration_minutes: Option<f64>,
    #[serde(default)]
    attendees: Option<Vec<String>>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    meeting_type: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    flexibility: Option<String>,
}

/// The single gate between oracle text and a `ParsedBookingRequest`.
/// `None` means the reply is unusable and the caller must fall back.
pub fn parse_extraction(response: &str, ctx: &ConversationContext) -> Option<ParsedBookingRequest> {
    let object = json_object(strip_reasoning(response))?;
    let raw: RawExtraction = serde_json::from_value(object).ok()?;

    let summary = raw
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Meeting".to_string());

    let duration = raw
        .duration_minutes
        .filter(|d| d.is_finite() && *d >= 1.0 && *d <= f64::from(u32::MAX))
        .map(|d| d.round() as u32)
        .unwrap_or(ctx.default_duration);

    let mut request = ParsedBookingRequest::new(summary, duration);
    request.start_time = raw
        .start_time
        .as_deref()
        .and_then(|s| parse_start_time(s, &ctx.timezone));
    request.attendees = raw.attendees.unwrap_or_default();
    request.description = raw.description.unwrap_or_default();
    request.meeting_type = raw
        .meeting_type
        .as_deref()
        .and_then(MeetingType::parse)
        .unwrap_or_default();
    request.urgency = raw
        .urgency
        .as_deref()
        .and_then(Urgency::parse)
        .unwrap_or_default();
    request.flexibility = raw
        .flexibility
        .as_deref()
        .and_then(Flexibility::parse)
        .unwrap_or_default();
    Some(request)
}

/// RFC 3339 is converted into `tz`; a naive timestamp is read as wall-clock time in `tz`.
fn parse_start_time(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(tz));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(tz));
    }

    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
}

/// Reasoning models may prefix their answer with a `<think>` block.
fn strip_reasoning(response: &str) -> &str {
    match response.rfind("</think>") {
        Some(idx) => response[idx + "</think>".len()..].trim(),
        None => response.trim(),
    }
}

fn json_object(response: &str) -> Option<serde_json::Value> {
    let as_object = |s: &str| {
        serde_json::from_str::<serde_json::Value>(s)
            .ok()
            .filter(|v| v.is_object())
    };

    // Try direct parse first
    if let Some(value) = as_object(response) {
        return Some(value);
    }

    // Strip markdown code fences
    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();
    if let Some(value) = as_object(cleaned) {
        return Some(value);
    }

    // Try to find JSON object in the response
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    as_object(&cleaned[start..=end])
}
