use chrono::{DateTime, Days, TimeDelta};
use chrono_tz::Tz;

use crate::models::{BusinessHours, Flexibility};
use crate::services::calendar::CalendarService;
use crate::services::timeparse::at_wall_clock;

pub const MAX_ALTERNATIVES: usize = 5;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SchedulingError {
    #[error("That time is outside business hours ({hours}).")]
    OutsideBusinessHours { hours: String },

    #[error("That time slot is already booked.")]
    Conflict,
}

pub fn is_within_business_hours(at: &DateTime<Tz>, hours: &BusinessHours) -> bool {
    hours.contains(at.time())
}

/// Business hours are checked before the calendar is consulted.
pub async fn validate_slot(
    calendar: &CalendarService,
    hours: &BusinessHours,
    start: &DateTime<Tz>,
    duration_minutes: u32,
) -> Result<(), SchedulingError> {
    if !is_within_business_hours(start, hours) {
        return Err(SchedulingError::OutsideBusinessHours {
            hours: hours.to_human_readable(),
        });
    }

    if !calendar.check_availability(start, duration_minutes, 0).await {
        return Err(SchedulingError::Conflict);
    }

    Ok(())
}

/// Open slots near `requested`, in discovery order, at most `MAX_ALTERNATIVES`.
///
/// Walks each day of the flexibility's horizon from business-hours start,
/// keeping candidates whose whole interval fits before business-hours end
/// and is free. Starts earlier than `now` are never proposed.
pub async fn find_alternatives(
    calendar: &CalendarService,
    hours: &BusinessHours,
    requested: &DateTime<Tz>,
    duration_minutes: u32,
    flexibility: Flexibility,
    now: &DateTime<Tz>,
) -> Vec<DateTime<Tz>> {
    let profile = flexibility.search_profile();
    let tz = requested.timezone();
    let length = TimeDelta::minutes(i64::from(duration_minutes));
    let mut found = Vec::new();

    for offset in 0..profile.days {
        let Some(day) = requested
            .date_naive()
            .checked_add_days(Days::new(u64::from(offset)))
        else {
            break;
        };
        let (Some(open), Some(close)) = (
            at_wall_clock(&tz, day, hours.start),
            at_wall_clock(&tz, day, hours.end),
        ) else {
            continue;
        };

        let step = TimeDelta::minutes(i64::from(if offset == 0 {
            profile.first_day_step_minutes
        } else {
            profile.later_step_minutes
        }));

        let mut current = open;
        while current + length <= close {
            if current >= *now && calendar.check_availability(&current, duration_minutes, 0).await {
                found.push(current);
                if found.len() >= MAX_ALTERNATIVES {
                    return found;
                }
            }
            current += step;
        }
    }

    found
}
