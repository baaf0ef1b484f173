pub mod availability;
pub mod booking;
pub mod conversation;
pub mod event;
pub mod intent;
pub mod reply;

pub use availability::BusinessHours;
pub use booking::{DayRef, MeetingReference, ParsedBookingRequest, ReferenceTarget};
pub use conversation::{
    ContextDefaults, ContextSummary, ConversationContext, HistoryEntry, PendingAction,
};
pub use event::{CalendarEvent, CalendarStats, EventStatus, NewEvent};
pub use intent::{Flexibility, Intent, MeetingType, SearchProfile, Urgency};
pub use reply::{Reply, Situation};
