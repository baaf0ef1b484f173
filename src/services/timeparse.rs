//! Deterministic resolution of natural-language time expressions.
//!
//! Patterns are tried in a fixed priority order. The first one that both
//! matches and resolves to a real instant wins; a match that cannot be
//! resolved (unknown weekday, 25 o'clock, a DST gap) falls through to the
//! next pattern. No match at all means "time unresolved".

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use regex::{Captures, Regex};

use crate::models::BusinessHours;

type Resolver = fn(&Captures<'_>, &DateTime<Tz>, &BusinessHours) -> Option<DateTime<Tz>>;

static PATTERNS: LazyLock<Vec<(Regex, Resolver)>> = LazyLock::new(|| {
    let rules: [(&str, Resolver); 10] = [
        (r"in (\d+) (?:hour|hr)s?", in_hours),
        (r"in (\d+) (?:minute|min)s?", in_minutes),
        (r"tomorrow at (\d{1,2}):?(\d{2})?\s*(am|pm)?", tomorrow_at),
        (r"next (\w+)", next_weekday),
        (r"(\w+) at (\d{1,2}):?(\d{2})?\s*(am|pm)?", weekday_at),
        (r"at (\d{1,2}):?(\d{2})?\s*(am|pm)?", today_at),
        (r"(\d{1,2}):?(\d{2})?\s*(am|pm)", today_at),
        (r"end of (?:the )?week", end_of_week),
        (r"beginning of (?:the )?week", beginning_of_week),
        (r"next week same time", next_week_same_time),
    ];
    rules
        .into_iter()
        .map(|(pattern, resolve)| (Regex::new(pattern).expect("valid time pattern"), resolve))
        .collect()
});

pub fn parse_time_expression(
    text: &str,
    now: &DateTime<Tz>,
    hours: &BusinessHours,
) -> Option<DateTime<Tz>> {
    let text = text.to_lowercase();
    PATTERNS.iter().find_map(|(re, resolve)| {
        let caps = re.captures(&text)?;
        let resolved = resolve(&caps, now, hours);
        if resolved.is_none() {
            tracing::debug!(pattern = re.as_str(), "time pattern matched but did not resolve");
        }
        resolved
    })
}

/// The instant at which the wall clock in `tz` reads `date time`.
/// Ambiguous (DST fold) times take the earlier instant; skipped times have none.
pub fn at_wall_clock(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(time)).earliest()
}

pub fn weekday_named(name: &str) -> Option<Weekday> {
    match name {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// 12-hour convention: 12am is 0, 12pm is 12, other pm hours add 12.
pub fn clock_time(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Option<NaiveTime> {
    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = match minute {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    match meridiem {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn group<'t>(caps: &Captures<'t>, i: usize) -> Option<&'t str> {
    caps.get(i).map(|m| m.as_str())
}

fn days_until(from: Weekday, to: Weekday) -> i64 {
    to.num_days_from_monday() as i64 - from.num_days_from_monday() as i64
}

fn date_plus(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(u64::try_from(days).ok()?))
}

fn in_hours(caps: &Captures<'_>, now: &DateTime<Tz>, _: &BusinessHours) -> Option<DateTime<Tz>> {
    let n: i64 = caps[1].parse().ok()?;
    now.checked_add_signed(Duration::try_hours(n)?)
}

fn in_minutes(caps: &Captures<'_>, now: &DateTime<Tz>, _: &BusinessHours) -> Option<DateTime<Tz>> {
    let n: i64 = caps[1].parse().ok()?;
    now.checked_add_signed(Duration::try_minutes(n)?)
}

fn tomorrow_at(caps: &Captures<'_>, now: &DateTime<Tz>, _: &BusinessHours) -> Option<DateTime<Tz>> {
    let time = clock_time(&caps[1], group(caps, 2), group(caps, 3))?;
    let tomorrow = now.date_naive().succ_opt()?;
    at_wall_clock(&now.timezone(), tomorrow, time)
}

/// "next monday" never means today: a same-weekday match jumps a full week.
fn next_weekday(
    caps: &Captures<'_>,
    now: &DateTime<Tz>,
    hours: &BusinessHours,
) -> Option<DateTime<Tz>> {
    let target = weekday_named(&caps[1])?;
    let mut days_ahead = days_until(now.weekday(), target);
    if days_ahead <= 0 {
        days_ahead += 7;
    }
    let date = date_plus(now.date_naive(), days_ahead)?;
    at_wall_clock(&now.timezone(), date, hours.start)
}

/// "monday at 3pm" may be today if 3pm is still ahead.
fn weekday_at(caps: &Captures<'_>, now: &DateTime<Tz>, _: &BusinessHours) -> Option<DateTime<Tz>> {
    let target = weekday_named(&caps[1])?;
    let time = clock_time(&caps[2], group(caps, 3), group(caps, 4))?;
    let tz = now.timezone();
    let today = now.date_naive();

    let mut days_ahead = days_until(now.weekday(), target);
    if days_ahead < 0 {
        days_ahead += 7;
    } else if days_ahead == 0 {
        let candidate = at_wall_clock(&tz, today, time)?;
        if candidate <= *now {
            days_ahead = 7;
        }
    }
    at_wall_clock(&tz, date_plus(today, days_ahead)?, time)
}

fn today_at(caps: &Captures<'_>, now: &DateTime<Tz>, _: &BusinessHours) -> Option<DateTime<Tz>> {
    let time = clock_time(&caps[1], group(caps, 2), group(caps, 3))?;
    let tz = now.timezone();
    let today = now.date_naive();
    match at_wall_clock(&tz, today, time) {
        Some(candidate) if candidate > *now => Some(candidate),
        _ => at_wall_clock(&tz, today.succ_opt()?, time),
    }
}

fn end_of_week(_: &Captures<'_>, now: &DateTime<Tz>, hours: &BusinessHours) -> Option<DateTime<Tz>> {
    let mut days_ahead = days_until(now.weekday(), Weekday::Fri);
    if days_ahead < 0 {
        days_ahead += 7;
    }
    at_wall_clock(&now.timezone(), date_plus(now.date_naive(), days_ahead)?, hours.end)
}

/// Always the following Monday, even when today is Monday.
fn beginning_of_week(
    _: &Captures<'_>,
    now: &DateTime<Tz>,
    hours: &BusinessHours,
) -> Option<DateTime<Tz>> {
    let days_ahead = 7 - now.weekday().num_days_from_monday() as i64;
    at_wall_clock(&now.timezone(), date_plus(now.date_naive(), days_ahead)?, hours.start)
}

fn next_week_same_time(
    _: &Captures<'_>,
    now: &DateTime<Tz>,
    _: &BusinessHours,
) -> Option<DateTime<Tz>> {
    at_wall_clock(&now.timezone(), date_plus(now.date_naive(), 7)?, now.time())
}
