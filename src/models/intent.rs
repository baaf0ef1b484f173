use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    BookMeeting,
    CheckAvailability,
    RescheduleMeeting,
    CancelMeeting,
    ListMeetings,
    Greeting,
    Unclear,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::BookMeeting,
        Intent::CheckAvailability,
        Intent::RescheduleMeeting,
        Intent::CancelMeeting,
        Intent::ListMeetings,
        Intent::Greeting,
        Intent::Unclear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::BookMeeting => "book_meeting",
            Intent::CheckAvailability => "check_availability",
            Intent::RescheduleMeeting => "reschedule_meeting",
            Intent::CancelMeeting => "cancel_meeting",
            Intent::ListMeetings => "list_meetings",
            Intent::Greeting => "greeting",
            Intent::Unclear => "unclear",
        }
    }

    /// Exact, case-insensitive lookup. Anything else is `Unclear`.
    pub fn from_token(token: &str) -> Self {
        let token = token.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == token)
            .unwrap_or(Intent::Unclear)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Urgency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Urgency::Low),
            "normal" => Some(Urgency::Normal),
            "high" => Some(Urgency::High),
            "urgent" => Some(Urgency::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Flexibility {
    #[default]
    Rigid,
    Flexible,
    VeryFlexible,
}

/// How far and how finely the alternative-slot search looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchProfile {
    pub days: u32,
    pub first_day_step_minutes: i64,
    pub later_step_minutes: i64,
}

impl Flexibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flexibility::Rigid => "rigid",
            Flexibility::Flexible => "flexible",
            Flexibility::VeryFlexible => "very_flexible",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "rigid" => Some(Flexibility::Rigid),
            "flexible" => Some(Flexibility::Flexible),
            "very_flexible" => Some(Flexibility::VeryFlexible),
            _ => None,
        }
    }

    pub fn search_profile(&self) -> SearchProfile {
        match self {
            Flexibility::Rigid => SearchProfile {
                days: 2,
                first_day_step_minutes: 30,
                later_step_minutes: 30,
            },
            Flexibility::Flexible => SearchProfile {
                days: 7,
                first_day_step_minutes: 30,
                later_step_minutes: 60,
            },
            Flexibility::VeryFlexible => SearchProfile {
                days: 14,
                first_day_step_minutes: 30,
                later_step_minutes: 120,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    #[default]
    Meeting,
    Call,
    Appointment,
    Interview,
    Standup,
}

impl MeetingType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "meeting" => Some(MeetingType::Meeting),
            "call" => Some(MeetingType::Call),
            "appointment" => Some(MeetingType::Appointment),
            "interview" => Some(MeetingType::Interview),
            "standup" | "stand-up" => Some(MeetingType::Standup),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MeetingType::Meeting => "Meeting",
            MeetingType::Call => "Call",
            MeetingType::Appointment => "Appointment",
            MeetingType::Interview => "Interview",
            MeetingType::Standup => "Standup",
        }
    }
}
