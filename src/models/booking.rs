use chrono::{DateTime, Datelike, NaiveDate, Timelike, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::{CalendarEvent, Flexibility, Intent, MeetingType, Urgency};

/// Structured booking parameters for one turn. `start_time == None` means
/// the time is unresolved and no calendar call may be made for it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParsedBookingRequest {
    pub intent: Intent,
    pub summary: String,
    pub start_time: Option<DateTime<Tz>>,
    pub duration_minutes: u32,
    pub attendees: Vec<String>,
    pub description: String,
    pub meeting_type: MeetingType,
    pub urgency: Urgency,
    pub flexibility: Flexibility,
}

impl ParsedBookingRequest {
    pub fn new(summary: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            intent: Intent::BookMeeting,
            summary: summary.into(),
            start_time: None,
            duration_minutes: duration_minutes.max(1),
            attendees: Vec::new(),
            description: String::new(),
            meeting_type: MeetingType::default(),
            urgency: Urgency::default(),
            flexibility: Flexibility::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayRef {
    Today,
    Tomorrow,
    Weekday(Weekday),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTarget {
    /// `hour` is 0-23 when `meridiem_given`, otherwise a 12-hour-ambiguous clock hour.
    TimeOfDay {
        hour: u32,
        minute: u32,
        meridiem_given: bool,
    },
    Day(DayRef),
    Attendee(String),
    Title(String),
}

/// Best-effort pointer at an existing meeting, taken from the user's words.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MeetingReference {
    pub phrase: String,
    pub target: ReferenceTarget,
}

/// Title words that mean "the soonest upcoming meeting".
const SOONEST_WORDS: &[&str] = &["my", "next", "our", "upcoming", "current"];

impl MeetingReference {
    pub fn matches(&self, event: &CalendarEvent, tz: &Tz, today: NaiveDate) -> bool {
        let summary = event.summary.to_lowercase();
        if !self.phrase.is_empty() && summary.contains(&self.phrase) {
            return true;
        }

        let local = event.start.with_timezone(tz);
        match &self.target {
            ReferenceTarget::TimeOfDay {
                hour,
                minute,
                meridiem_given,
            } => {
                let hour_matches = if *meridiem_given {
                    local.hour() == *hour
                } else {
                    local.hour() % 12 == hour % 12
                };
                hour_matches && local.minute() == *minute
            }
            ReferenceTarget::Day(DayRef::Today) => local.date_naive() == today,
            ReferenceTarget::Day(DayRef::Tomorrow) => {
                today.succ_opt() == Some(local.date_naive())
            }
            ReferenceTarget::Day(DayRef::Weekday(weekday)) => {
                local.weekday() == *weekday && local.date_naive() >= today
            }
            ReferenceTarget::Attendee(name) => {
                summary.contains(name.as_str())
                    || event
                        .attendees
                        .iter()
                        .any(|a| a.to_lowercase().contains(name.as_str()))
            }
            ReferenceTarget::Title(word) => {
                SOONEST_WORDS.contains(&word.as_str()) || summary.contains(word.as_str())
            }
        }
    }
}
