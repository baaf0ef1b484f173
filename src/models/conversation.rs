use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::{BusinessHours, Intent, MeetingReference, ParsedBookingRequest};

pub const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A provisional action awaiting the user's next message. Only one at a time.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PendingAction {
    Booking(ParsedBookingRequest),
    Reschedule { reference: MeetingReference },
}

/// Preferences a new session starts with.
#[derive(Debug, Clone, Copy)]
pub struct ContextDefaults {
    pub timezone: Tz,
    pub business_hours: BusinessHours,
    pub default_duration: u32,
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            business_hours: BusinessHours::default(),
            default_duration: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub user_id: String,
    pub last_intent: Option<Intent>,
    pub pending: Option<PendingAction>,
    history: VecDeque<HistoryEntry>,
    pub timezone: Tz,
    pub default_duration: u32,
    pub business_hours: BusinessHours,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContextSummary {
    pub last_intent: Option<Intent>,
    pub has_pending_booking: bool,
    pub conversation_length: usize,
    pub user_timezone: String,
    pub business_hours: String,
    pub default_duration: u32,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>, defaults: &ContextDefaults) -> Self {
        Self {
            user_id: user_id.into(),
            last_intent: None,
            pending: None,
            history: VecDeque::with_capacity(MAX_HISTORY + 1),
            timezone: defaults.timezone,
            default_duration: defaults.default_duration.max(1),
            business_hours: defaults.business_hours,
            last_activity: Utc::now(),
        }
    }

    /// Appends the user's message, evicting the oldest entries beyond `MAX_HISTORY`.
    pub fn record_user_message(&mut self, text: &str, at: DateTime<Utc>) {
        self.history.push_back(HistoryEntry {
            user: text.to_string(),
            assistant: None,
            timestamp: at,
        });
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        self.last_activity = at;
    }

    pub fn record_reply(&mut self, reply: &str) {
        if let Some(last) = self.history.back_mut() {
            last.assistant = Some(reply.to_string());
        }
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    pub fn recent_history(&self, n: usize) -> Vec<&HistoryEntry> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).collect()
    }

    pub fn pending_booking(&self) -> Option<&ParsedBookingRequest> {
        match &self.pending {
            Some(PendingAction::Booking(request)) => Some(request),
            _ => None,
        }
    }

    pub fn pending_reschedule(&self) -> Option<&MeetingReference> {
        match &self.pending {
            Some(PendingAction::Reschedule { reference }) => Some(reference),
            _ => None,
        }
    }

    pub fn set_timezone(&mut self, name: &str) -> anyhow::Result<()> {
        self.timezone = name
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("unknown timezone {name}: {e}"))?;
        Ok(())
    }

    pub fn set_business_hours(&mut self, hours: BusinessHours) {
        self.business_hours = hours;
    }

    pub fn set_default_duration(&mut self, minutes: u32) -> anyhow::Result<()> {
        if minutes == 0 {
            anyhow::bail!("default duration must be positive");
        }
        self.default_duration = minutes;
        Ok(())
    }

    /// Forgets the dialogue but keeps the user's preferences.
    pub fn reset(&mut self) {
        self.last_intent = None;
        self.pending = None;
        self.history.clear();
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            last_intent: self.last_intent,
            has_pending_booking: self.pending.is_some(),
            conversation_length: self.history.len(),
            user_timezone: self.timezone.name().to_string(),
            business_hours: format!(
                "{} - {}",
                self.business_hours.start.format("%H:%M"),
                self.business_hours.end.format("%H:%M")
            ),
            default_duration: self.default_duration,
        }
    }

    /// Compact JSON handed to the intent classifier.
    pub fn intent_prompt_context(&self) -> String {
        serde_json::json!({
            "last_intent": self.last_intent.map(|i| i.as_str()),
            "has_pending_booking": self.pending.is_some(),
            "recent_messages": self.recent_history(3),
        })
        .to_string()
    }

    /// Compact JSON handed to the field extractor.
    pub fn extraction_prompt_context(&self) -> String {
        serde_json::json!({
            "last_booking": self.pending,
            "preferences": {
                "default_duration": self.default_duration,
                "business_hours": self.business_hours.to_human_readable(),
            },
        })
        .to_string()
    }
}
