//! Keyword and regex extraction used when the oracle cannot be trusted.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Duration, Timelike};
use chrono_tz::Tz;
use regex::Regex;

use crate::models::{
    BusinessHours, ConversationContext, DayRef, Flexibility, MeetingReference, MeetingType,
    ParsedBookingRequest, ReferenceTarget,
};
use crate::services::timeparse::{at_wall_clock, clock_time, parse_time_expression, weekday_named};

static COMBINED_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(?:hours?|hrs?|h)\s*(?:and\s*)?(\d+)\s*(?:minutes?|mins?|m)\b")
        .expect("valid combined duration regex")
});
static HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:hour|hr)s?").expect("valid hours regex"));
static MINUTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:minute|min)s?").expect("valid minutes regex"));

static REF_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})(?::(\d{2})\s*(am|pm)?|\s*(am|pm))").expect("valid reference time regex")
});
static REF_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(tomorrow|today|monday|tuesday|wednesday|thursday|friday|saturday|sunday)")
        .expect("valid reference day regex")
});
static REF_WITH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"meeting with (\w+)").expect("valid reference attendee regex"));
static REF_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+) meeting").expect("valid reference title regex"));

const SUMMARY_KEYWORDS: [(&str, MeetingType); 4] = [
    ("interview", MeetingType::Interview),
    ("call", MeetingType::Call),
    ("appointment", MeetingType::Appointment),
    ("standup", MeetingType::Standup),
];

/// "<word> meeting" with one of these names no meeting in particular.
const VAGUE_TITLE_WORDS: [&str; 9] = ["a", "an", "the", "this", "that", "any", "some", "one", "another"];

const FLEXIBLE_WORDS: [&str; 3] = ["flexible", "around", "roughly"];

const MAX_WINDOW_SLOTS: usize = 64;

/// Builds a booking request from the raw text alone.
pub fn fallback_booking(
    text: &str,
    now: &DateTime<Tz>,
    ctx: &ConversationContext,
) -> ParsedBookingRequest {
    let lower = text.to_lowercase();

    let meeting_type = SUMMARY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, kind)| *kind)
        .unwrap_or_default();

    let mut request = ParsedBookingRequest::new(
        meeting_type.label(),
        extract_duration(&lower).unwrap_or(ctx.default_duration),
    );
    request.meeting_type = meeting_type;
    request.start_time = parse_time_expression(&lower, now, &ctx.business_hours);
    request.flexibility = if FLEXIBLE_WORDS.iter().any(|w| lower.contains(w)) {
        Flexibility::Flexible
    } else {
        Flexibility::Rigid
    };
    request
}

/// Duration stated in the text, in minutes. Zero is treated as not stated.
pub fn extract_duration(text: &str) -> Option<u32> {
    let text = text.to_lowercase();
    let minutes = if let Some(caps) = HOURS_RE.captures(&text) {
        caps[1].parse::<u32>().ok()?.checked_mul(60)?
    } else if let Some(caps) = MINUTES_RE.captures(&text) {
        caps[1].parse().ok()?
    } else if let Some(caps) = COMBINED_DURATION_RE.captures(&text) {
        let hours: u32 = caps[1].parse().ok()?;
        let minutes: u32 = caps[2].parse().ok()?;
        hours.checked_mul(60)?.checked_add(minutes)?
    } else {
        return None;
    };
    (minutes > 0).then_some(minutes)
}

/// First of: time of day, day name, "meeting with X", "<word> meeting".
pub fn extract_meeting_reference(text: &str) -> Option<MeetingReference> {
    let text = text.to_lowercase();

    if let Some(caps) = REF_TIME_RE.captures(&text) {
        let meridiem = caps.get(3).or(caps.get(4)).map(|m| m.as_str());
        let minute = caps.get(2).map(|m| m.as_str());
        if let Some(time) = clock_time(&caps[1], minute, meridiem) {
            return Some(MeetingReference {
                phrase: caps[0].trim().to_string(),
                target: ReferenceTarget::TimeOfDay {
                    hour: time.hour(),
                    minute: time.minute(),
                    meridiem_given: meridiem.is_some(),
                },
            });
        }
    }

    if let Some(caps) = REF_DAY_RE.captures(&text) {
        let day = match &caps[1] {
            "today" => DayRef::Today,
            "tomorrow" => DayRef::Tomorrow,
            name => DayRef::Weekday(weekday_named(name)?),
        };
        return Some(MeetingReference {
            phrase: caps[0].to_string(),
            target: ReferenceTarget::Day(day),
        });
    }

    if let Some(caps) = REF_WITH_RE.captures(&text) {
        return Some(MeetingReference {
            phrase: caps[0].to_string(),
            target: ReferenceTarget::Attendee(caps[1].to_string()),
        });
    }

    REF_TITLE_RE
        .captures(&text)
        .filter(|caps| !VAGUE_TITLE_WORDS.contains(&&caps[1]))
        .map(|caps| MeetingReference {
            phrase: caps[0].to_string(),
            target: ReferenceTarget::Title(caps[1].to_string()),
        })
}

/// Candidate slot starts for an availability question, from coarse phrases:
/// "tomorrow" is every hour of tomorrow's business day, "next week" every
/// two hours of each weekday of the following week. Anything else is empty.
pub fn availability_window(text: &str, now: &DateTime<Tz>, hours: &BusinessHours) -> Vec<DateTime<Tz>> {
    let text = text.to_lowercase();
    let tz = now.timezone();
    let today = now.date_naive();

    let (days, step): (Vec<_>, Duration) = if text.contains("tomorrow") {
        (today.succ_opt().into_iter().collect(), Duration::hours(1))
    } else if text.contains("next week") {
        let to_monday = 7 - u64::from(now.weekday().num_days_from_monday());
        let monday = today.checked_add_days(Days::new(to_monday));
        let week = monday
            .into_iter()
            .flat_map(|m| (0..5).filter_map(move |d| m.checked_add_days(Days::new(d))))
            .collect();
        (week, Duration::hours(2))
    } else {
        return Vec::new();
    };

    let mut slots = Vec::new();
    for day in days {
        let (Some(open), Some(close)) = (
            at_wall_clock(&tz, day, hours.start),
            at_wall_clock(&tz, day, hours.end),
        ) else {
            continue;
        };
        let mut current = open;
        while current < close && slots.len() < MAX_WINDOW_SLOTS {
            slots.push(current);
            current += step;
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextDefaults;
    use chrono::{NaiveDate, TimeZone, Weekday};

    fn tz() -> Tz {
        chrono_tz::America::New_York
    }

    // 2025-06-18 is a Wednesday.
    fn now() -> DateTime<Tz> {
        tz().with_ymd_and_hms(2025, 6, 18, 10, 15, 0).unwrap()
    }

    fn ctx() -> ConversationContext {
        let defaults = ContextDefaults {
            timezone: tz(),
            ..ContextDefaults::default()
        };
        ConversationContext::new("tester", &defaults)
    }

    #[test]
    fn test_fallback_call_with_minutes_and_time() {
        let request = fallback_booking("book a call for 45 min tomorrow at 2pm", &now(), &ctx());
        assert_eq!(request.summary, "Call");
        assert_eq!(request.meeting_type, MeetingType::Call);
        assert_eq!(request.duration_minutes, 45);
        assert_eq!(
            request.start_time,
            Some(tz().with_ymd_and_hms(2025, 6, 19, 14, 0, 0).unwrap())
        );
        assert_eq!(request.flexibility, Flexibility::Rigid);
    }

    #[test]
    fn test_fallback_defaults() {
        let request = fallback_booking("set something up please", &now(), &ctx());
        assert_eq!(request.summary, "Meeting");
        assert_eq!(request.duration_minutes, 60);
        assert_eq!(request.start_time, None);
        assert_eq!(request.flexibility, Flexibility::Rigid);
    }

    #[test]
    fn test_fallback_keyword_priority() {
        let request = fallback_booking("interview call with the candidate", &now(), &ctx());
        assert_eq!(request.summary, "Interview");
        let request = fallback_booking("daily standup", &now(), &ctx());
        assert_eq!(request.summary, "Standup");
    }

    #[test]
    fn test_fallback_flexibility_words() {
        for text in ["i'm flexible", "around noon-ish", "roughly thursday"] {
            assert_eq!(fallback_booking(text, &now(), &ctx()).flexibility, Flexibility::Flexible);
        }
    }

    #[test]
    fn test_extract_duration_forms() {
        assert_eq!(extract_duration("2 hours"), Some(120));
        assert_eq!(extract_duration("a 1hr sync"), Some(60));
        assert_eq!(extract_duration("30 mins"), Some(30));
        // Spelled-out hours win over the combined form.
        assert_eq!(extract_duration("book 1 hour 30 minutes tomorrow at 2pm"), Some(60));
        assert_eq!(extract_duration("1h 15m"), Some(75));
        assert_eq!(extract_duration("0 minutes"), None);
        assert_eq!(extract_duration("tomorrow at 2pm"), None);
    }

    #[test]
    fn test_reference_time_of_day() {
        let r = extract_meeting_reference("cancel my 3pm meeting").unwrap();
        assert_eq!(r.phrase, "3pm");
        assert_eq!(
            r.target,
            ReferenceTarget::TimeOfDay { hour: 15, minute: 0, meridiem_given: true }
        );

        let r = extract_meeting_reference("move the 10:30 sync").unwrap();
        assert_eq!(
            r.target,
            ReferenceTarget::TimeOfDay { hour: 10, minute: 30, meridiem_given: false }
        );
    }

    #[test]
    fn test_reference_order() {
        let r = extract_meeting_reference("cancel tomorrow's meeting with sam").unwrap();
        assert_eq!(r.target, ReferenceTarget::Day(DayRef::Tomorrow));

        let r = extract_meeting_reference("cancel the meeting with Sam").unwrap();
        assert_eq!(r.target, ReferenceTarget::Attendee("sam".to_string()));

        let r = extract_meeting_reference("drop the budget meeting").unwrap();
        assert_eq!(r.phrase, "budget meeting");
        assert_eq!(r.target, ReferenceTarget::Title("budget".to_string()));

        let r = extract_meeting_reference("cancel friday").unwrap();
        assert_eq!(r.target, ReferenceTarget::Day(DayRef::Weekday(Weekday::Fri)));

        assert_eq!(extract_meeting_reference("cancel it"), None);
    }

    #[test]
    fn test_vague_title_is_no_reference() {
        assert_eq!(extract_meeting_reference("i need to cancel a meeting"), None);
        assert_eq!(extract_meeting_reference("reschedule the meeting"), None);
        assert_eq!(extract_meeting_reference("move that meeting please"), None);

        let r = extract_meeting_reference("cancel my meeting").unwrap();
        assert_eq!(r.target, ReferenceTarget::Title("my".to_string()));
    }

    #[test]
    fn test_availability_window_tomorrow_hourly() {
        let slots = availability_window("what's free tomorrow?", &now(), &BusinessHours::default());
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0], tz().with_ymd_and_hms(2025, 6, 19, 9, 0, 0).unwrap());
        assert_eq!(slots[7].hour(), 16);
    }

    #[test]
    fn test_availability_window_next_week_every_two_hours() {
        let slots = availability_window("anything next week", &now(), &BusinessHours::default());
        // 09, 11, 13, 15 on each of five weekdays.
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0].date_naive(), NaiveDate::from_ymd_opt(2025, 6, 23).unwrap());
        assert_eq!(slots[19].date_naive(), NaiveDate::from_ymd_opt(2025, 6, 27).unwrap());
        assert_eq!(slots[19].hour(), 15);
    }

    #[test]
    fn test_availability_window_unknown_phrase() {
        assert!(availability_window("am i free?", &now(), &BusinessHours::default()).is_empty());
    }
}
