use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::models::{
    CalendarEvent, ConversationContext, Flexibility, Intent, MeetingReference, ParsedBookingRequest,
    PendingAction, ReferenceTarget, Reply, Situation,
};
use crate::services::ai::intent::{classify_intent, extract_booking_fields, rephrase};
use crate::services::ai::LlmProvider;
use crate::services::calendar::CalendarService;
use crate::services::extraction::{availability_window, extract_duration, extract_meeting_reference};
use crate::services::scheduling::{find_alternatives, validate_slot, SchedulingError};

const WHEN_FORMAT: &str = "%A, %B %d at %I:%M %p";
const ALTERNATIVES_SHOWN: usize = 3;
const MAX_OPEN_SLOTS: usize = 10;
const LIST_LIMIT: usize = 10;
const LIST_DAYS_AHEAD: u32 = 30;

const GREETING: &str = "Hello! I'm your scheduling assistant. I can help you book meetings, check your availability, and manage your calendar. What would you like to do today?";

const CLARIFICATION: &str = "I'm not quite sure what you'd like me to help with. I can assist you with:

- Booking meetings: \"Book a meeting tomorrow at 3pm\"
- Checking availability: \"What times are free tomorrow?\"
- Viewing your schedule: \"Show me my meetings\"
- Cancelling meetings: \"Cancel my 2pm meeting\"
- Rescheduling: \"Move my budget meeting to Friday at 4pm\"

What would you like to do?";

/// Runs one dialogue turn at a time against a caller-owned context.
pub struct Assistant {
    llm: Arc<dyn LlmProvider>,
    calendar: Arc<CalendarService>,
    rephrase: bool,
}

impl Assistant {
    pub fn new(llm: Arc<dyn LlmProvider>, calendar: Arc<CalendarService>) -> Self {
        Self {
            llm,
            calendar,
            rephrase: false,
        }
    }

    pub fn with_rephrasing(mut self, enabled: bool) -> Self {
        self.rephrase = enabled;
        self
    }

    pub async fn handle_turn(&self, ctx: &mut ConversationContext, text: &str) -> String {
        self.handle_turn_at(ctx, text, Utc::now()).await
    }

    /// Never fails: every fault becomes an apology and the context stays usable.
    pub async fn handle_turn_at(
        &self,
        ctx: &mut ConversationContext,
        text: &str,
        now: DateTime<Utc>,
    ) -> String {
        ctx.record_user_message(text, now);
        let now = now.with_timezone(&ctx.timezone);

        let intent = classify_intent(self.llm.as_ref(), text, &ctx.intent_prompt_context()).await;
        tracing::info!(user = %ctx.user_id, intent = intent.as_str(), "recognized intent");

        let reply = match self.dispatch(ctx, intent, text, &now).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(user = %ctx.user_id, intent = intent.as_str(), error = ?e, "turn failed");
                Reply::new(Situation::InternalError, apology(intent))
            }
        };

        let response = if self.rephrase && reply.situation.is_rephrasable() {
            rephrase(self.llm.as_ref(), &reply, text, ctx).await
        } else {
            reply.text
        };

        ctx.record_reply(&response);
        ctx.last_intent = Some(intent);
        response
    }

    async fn dispatch(
        &self,
        ctx: &mut ConversationContext,
        intent: Intent,
        text: &str,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<Reply> {
        match intent {
            Intent::Greeting => Ok(Reply::new(Situation::Greeting, GREETING)),
            Intent::BookMeeting => {
                let request = extract_booking_fields(self.llm.as_ref(), text, now, ctx).await;
                self.book(ctx, request, now).await
            }
            Intent::CheckAvailability => Ok(self.check_availability(ctx, text, now).await),
            Intent::ListMeetings => Ok(self.list_meetings(ctx, now).await),
            Intent::CancelMeeting => Ok(self.cancel(text, now).await),
            Intent::RescheduleMeeting => self.reschedule(ctx, text, now).await,
            Intent::Unclear => Ok(Reply::new(Situation::Clarification, CLARIFICATION)),
        }
    }

    async fn book(
        &self,
        ctx: &mut ConversationContext,
        request: ParsedBookingRequest,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<Reply> {
        let Some(start) = request.start_time else {
            return Ok(Reply::new(
                Situation::UnclearTime,
                format!(
                    "I'd be happy to book a {} for you! Could you please specify when you'd like to schedule it? You can say things like 'tomorrow at 3pm', 'next Monday at 10am', or 'in 2 hours'.",
                    request.summary.to_lowercase()
                ),
            ));
        };
        let when = start.format(WHEN_FORMAT).to_string();
        let end = meeting_end(&start, request.duration_minutes)?;

        match validate_slot(&self.calendar, &ctx.business_hours, &start, request.duration_minutes).await {
            Ok(()) => {
                let created = self
                    .calendar
                    .create_event(
                        &request.summary,
                        &start,
                        request.duration_minutes,
                        &request.description,
                        &request.attendees,
                        "",
                    )
                    .await;
                let Some(event) = created else {
                    return Ok(Reply::new(
                        Situation::BookingFailed,
                        format!(
                            "I couldn't book your {} for {when} because I'm having trouble accessing your calendar. Please try again in a moment.",
                            request.summary.to_lowercase()
                        ),
                    ));
                };

                tracing::info!(
                    user = %ctx.user_id,
                    event_id = %event.id,
                    start = %start,
                    end = %end,
                    "meeting booked"
                );
                if ctx.pending_booking().is_some() {
                    ctx.pending = None;
                }
                Ok(Reply::new(
                    Situation::BookingConfirmed,
                    format!(
                        "Perfect! I've successfully booked your {} for {when} ({} minutes). You should receive a calendar invitation shortly.",
                        request.summary.to_lowercase(),
                        request.duration_minutes
                    ),
                ))
            }
            Err(SchedulingError::OutsideBusinessHours { hours }) => Ok(Reply::new(
                Situation::OutsideBusinessHours,
                format!(
                    "The requested time ({when}) is outside business hours ({hours}). Would you like me to suggest times during business hours?"
                ),
            )),
            Err(SchedulingError::Conflict) => {
                let alternatives = find_alternatives(
                    &self.calendar,
                    &ctx.business_hours,
                    &start,
                    request.duration_minutes,
                    request.flexibility,
                    now,
                )
                .await;

                if alternatives.is_empty() {
                    return Ok(Reply::new(
                        Situation::NoAlternatives,
                        format!(
                            "Unfortunately, {when} is already booked, and I couldn't find any suitable alternatives in the next few days. Could you suggest a different time or date range?"
                        ),
                    ));
                }

                ctx.pending = Some(PendingAction::Booking(request));
                Ok(Reply::new(
                    Situation::ConflictWithAlternatives,
                    format!(
                        "I'm sorry, but {when} is already booked. Here are some available alternatives:\n\n{}\n\nWould any of these work for you? Just let me know which one you prefer!",
                        bullet_list(&alternatives[..alternatives.len().min(ALTERNATIVES_SHOWN)])
                    ),
                ))
            }
        }
    }

    async fn check_availability(
        &self,
        ctx: &ConversationContext,
        text: &str,
        now: &DateTime<Tz>,
    ) -> Reply {
        let candidates = availability_window(text, now, &ctx.business_hours);
        if candidates.is_empty() {
            return Reply::new(
                Situation::AvailabilityRangeNeeded,
                "I'd be happy to check your availability! Please specify a time range, like 'What's available tomorrow?' or 'Show me free slots next week'.",
            );
        }

        let mut open = Vec::new();
        for slot in candidates {
            if self
                .calendar
                .check_availability(&slot, ctx.default_duration, 0)
                .await
            {
                open.push(slot);
                if open.len() >= MAX_OPEN_SLOTS {
                    break;
                }
            }
        }

        if open.is_empty() {
            return Reply::new(
                Situation::NoSlotsAvailable,
                "I don't see any available slots in the requested time range. Would you like me to check a different time period?",
            );
        }

        Reply::new(
            Situation::SlotsAvailable,
            format!(
                "Here are your available time slots:\n\n{}\n\nWould you like to book any of these times?",
                bullet_list(&open)
            ),
        )
    }

    async fn list_meetings(&self, ctx: &ConversationContext, now: &DateTime<Tz>) -> Reply {
        let events = self
            .calendar
            .get_upcoming_events(now.with_timezone(&Utc), LIST_LIMIT, LIST_DAYS_AHEAD)
            .await;
        if events.is_empty() {
            return Reply::new(
                Situation::NoMeetings,
                "You don't have any upcoming meetings scheduled. Would you like to book a new one?",
            );
        }

        Reply::new(
            Situation::MeetingsListed,
            format!(
                "Here are your upcoming meetings:\n\n{}Would you like to reschedule or cancel any of these meetings?",
                meeting_list(&events, &ctx.timezone)
            ),
        )
    }

    async fn cancel(&self, text: &str, now: &DateTime<Tz>) -> Reply {
        let Some(reference) = extract_meeting_reference(text) else {
            return Reply::new(
                Situation::ReferenceNeeded,
                "I'd be happy to help cancel a meeting! Could you please specify which meeting you'd like to cancel? You can mention the time, title, or say something like 'cancel my 3pm meeting tomorrow'.",
            );
        };

        if self.calendar.cancel_event(&reference, now).await {
            tracing::info!(reference = %reference.phrase, "meeting cancelled");
            Reply::new(
                Situation::Cancelled,
                "I've successfully cancelled your meeting. You should receive a cancellation notification shortly.",
            )
        } else {
            Reply::new(
                Situation::CancelFailed,
                "I couldn't find that meeting in your calendar. Could you please check the details and try again?",
            )
        }
    }

    async fn reschedule(
        &self,
        ctx: &mut ConversationContext,
        text: &str,
        now: &DateTime<Tz>,
    ) -> anyhow::Result<Reply> {
        let Some(reference) = reschedule_reference(text, ctx.pending_reschedule()) else {
            return Ok(Reply::new(
                Situation::ReferenceNeeded,
                "I'd be happy to help reschedule a meeting! Please specify which meeting you'd like to reschedule and the new time. For example: 'reschedule my 3pm meeting to 4pm tomorrow'.",
            ));
        };

        let request = extract_booking_fields(self.llm.as_ref(), text, now, ctx).await;
        let Some(new_start) = request.start_time else {
            ctx.pending = Some(PendingAction::Reschedule { reference });
            return Ok(Reply::new(
                Situation::NewTimeNeeded,
                "Got it. What's the new time you'd prefer for that meeting?",
            ));
        };

        let Some(event) = self.calendar.resolve_reference(&reference, now).await else {
            tracing::warn!(reference = %reference.phrase, "no meeting matches reschedule reference");
            return Ok(Reply::new(
                Situation::RescheduleFailed,
                "I couldn't find that meeting in your calendar. Could you please check the details and try again?",
            ));
        };

        let stated = extract_duration(text);
        let duration = match stated {
            Some(minutes) => minutes,
            None => u32::try_from(event.duration_minutes())
                .context("existing meeting has an invalid length")?
                .max(1),
        };
        let when = new_start.format(WHEN_FORMAT).to_string();
        meeting_end(&new_start, duration)?;

        if !self
            .calendar
            .check_availability_ignoring(&new_start, duration, 0, &event.id)
            .await
        {
            let alternatives = find_alternatives(
                &self.calendar,
                &ctx.business_hours,
                &new_start,
                duration,
                Flexibility::Flexible,
                now,
            )
            .await;
            if alternatives.is_empty() {
                return Ok(Reply::new(
                    Situation::NoAlternatives,
                    "The requested time isn't available and I couldn't find suitable alternatives. Could you suggest a different time?",
                ));
            }
            return Ok(Reply::new(
                Situation::ConflictWithAlternatives,
                format!(
                    "The requested new time is not available. Here are some alternatives:\n\n{}\n\nWhich time works best for you?",
                    bullet_list(&alternatives[..alternatives.len().min(ALTERNATIVES_SHOWN)])
                ),
            ));
        }

        if !self
            .calendar
            .reschedule_event(&reference, &new_start, stated, now)
            .await
        {
            return Ok(Reply::new(
                Situation::RescheduleFailed,
                "I had trouble rescheduling the meeting. Please check the meeting details and try again.",
            ));
        }

        tracing::info!(user = %ctx.user_id, event_id = %event.id, new_start = %new_start, "meeting rescheduled");
        if ctx.pending_reschedule().is_some() {
            ctx.pending = None;
        }
        Ok(Reply::new(
            Situation::Rescheduled,
            format!(
                "Perfect! I've rescheduled your meeting to {when}. All attendees will be notified of the change."
            ),
        ))
    }
}

/// Names (attendee, title) always win. A bare time or day is more likely the
/// new time when a reschedule is already waiting for one.
fn reschedule_reference(
    text: &str,
    pending: Option<&MeetingReference>,
) -> Option<MeetingReference> {
    match (extract_meeting_reference(text), pending) {
        (Some(named), _)
            if matches!(
                named.target,
                ReferenceTarget::Attendee(_) | ReferenceTarget::Title(_)
            ) =>
        {
            Some(named)
        }
        (_, Some(pending)) => Some(pending.clone()),
        (extracted, None) => extracted,
    }
}

fn meeting_end(start: &DateTime<Tz>, duration_minutes: u32) -> anyhow::Result<DateTime<Tz>> {
    start
        .checked_add_signed(TimeDelta::minutes(i64::from(duration_minutes)))
        .context("meeting end is out of range")
}

fn bullet_list(slots: &[DateTime<Tz>]) -> String {
    slots
        .iter()
        .map(|slot| format!("- {}", slot.format(WHEN_FORMAT)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn meeting_list(events: &[CalendarEvent], tz: &Tz) -> String {
    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            format!(
                "{}. **{}**\n   {}\n   {} minutes\n\n",
                i + 1,
                event.summary,
                event.start.with_timezone(tz).format(WHEN_FORMAT),
                event.duration_minutes()
            )
        })
        .collect()
}

fn apology(intent: Intent) -> &'static str {
    match intent {
        Intent::BookMeeting => "I encountered an error while processing your booking request. Please try again or contact support if the issue persists.",
        Intent::CheckAvailability => "I encountered an error while checking availability. Please try again.",
        Intent::ListMeetings => "I'm having trouble accessing your calendar right now. Please try again in a moment.",
        Intent::CancelMeeting => "I encountered an error while trying to cancel the meeting. Please try again or contact support.",
        Intent::RescheduleMeeting => "I encountered an error while trying to reschedule the meeting. Please try again.",
        Intent::Greeting | Intent::Unclear => "I apologize, but I encountered an unexpected error. Please try rephrasing your request or contact support if the issue persists.",
    }
}
