use serde::Serialize;

/// What happened during a turn, independent of the wording shown to the user.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    Greeting,
    UnclearTime,
    OutsideBusinessHours,
    BookingConfirmed,
    BookingFailed,
    ConflictWithAlternatives,
    NoAlternatives,
    AvailabilityRangeNeeded,
    SlotsAvailable,
    NoSlotsAvailable,
    MeetingsListed,
    NoMeetings,
    ReferenceNeeded,
    Cancelled,
    CancelFailed,
    NewTimeNeeded,
    Rescheduled,
    RescheduleFailed,
    Clarification,
    InternalError,
}

impl Situation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Situation::Greeting => "greeting",
            Situation::UnclearTime => "unclear_time",
            Situation::OutsideBusinessHours => "outside_business_hours",
            Situation::BookingConfirmed => "booking_successful",
            Situation::BookingFailed => "booking_failed",
            Situation::ConflictWithAlternatives => "time_conflict_with_alternatives",
            Situation::NoAlternatives => "no_alternatives",
            Situation::AvailabilityRangeNeeded => "availability_range_needed",
            Situation::SlotsAvailable => "slots_available",
            Situation::NoSlotsAvailable => "no_slots_available",
            Situation::MeetingsListed => "meetings_listed",
            Situation::NoMeetings => "no_meetings",
            Situation::ReferenceNeeded => "meeting_reference_needed",
            Situation::Cancelled => "meeting_cancelled",
            Situation::CancelFailed => "cancel_failed",
            Situation::NewTimeNeeded => "new_time_needed",
            Situation::Rescheduled => "meeting_rescheduled",
            Situation::RescheduleFailed => "reschedule_failed",
            Situation::Clarification => "clarification",
            Situation::InternalError => "internal_error",
        }
    }

    /// Fixed replies never go through the oracle for rewording.
    pub fn is_rephrasable(&self) -> bool {
        !matches!(self, Situation::Greeting | Situation::InternalError)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Reply {
    pub situation: Situation,
    pub text: String,
}

impl Reply {
    pub fn new(situation: Situation, text: impl Into<String>) -> Self {
        Self {
            situation,
            text: text.into(),
        }
    }
}
