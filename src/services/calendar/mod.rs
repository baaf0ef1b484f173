//! Calendar collaborator: a raw, fallible backend behind a fail-soft facade.
//!
//! `CalendarService` is what the dialogue talks to. It paces backend calls,
//! caches reads for a few minutes and turns every backend error into
//! `false`, an empty list or `None` after logging it.

pub mod google;
pub mod memory;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, DurationRound, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;
use tokio::time::{Duration, Instant};

use crate::models::{CalendarEvent, CalendarStats, MeetingReference, NewEvent};
use crate::services::timeparse::at_wall_clock;

/// Maximum events fetched when probing a window for conflicts.
const AVAILABILITY_PROBE_LIMIT: usize = 250;
const REFERENCE_SCAN_LIMIT: usize = 50;
const REFERENCE_SCAN_DAYS: u32 = 7;

#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Events overlapping `[start, end)`, soonest first.
    async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<CalendarEvent>>;

    async fn insert_event(&self, event: NewEvent) -> anyhow::Result<CalendarEvent>;

    async fn update_event(&self, event: &CalendarEvent) -> anyhow::Result<CalendarEvent>;

    async fn delete_event(&self, id: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Availability {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Upcoming {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    },
}

impl CacheKey {
    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let (s, e) = match self {
            CacheKey::Availability { start, end } => (*start, *end),
            CacheKey::Upcoming { start, end, .. } => (*start, *end),
        };
        s < end && e > start
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Free(bool),
    Events(Vec<CalendarEvent>),
}

#[derive(Debug)]
struct CacheEntry {
    value: Cached,
    stored_at: Instant,
}

pub struct CalendarService {
    backend: Box<dyn CalendarBackend>,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    cache_ttl: Duration,
    min_interval: Duration,
    last_call: tokio::sync::Mutex<Option<Instant>>,
    healthy: AtomicBool,
}

impl CalendarService {
    pub fn new(backend: Box<dyn CalendarBackend>, cache_ttl: Duration, min_interval: Duration) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
            min_interval,
            last_call: tokio::sync::Mutex::new(None),
            healthy: AtomicBool::new(true),
        }
    }

    /// True iff nothing active overlaps `[start - buffer, start + duration + buffer)`.
    /// Backend failure reads as busy.
    pub async fn check_availability(
        &self,
        start: &DateTime<Tz>,
        duration_minutes: u32,
        buffer_minutes: u32,
    ) -> bool {
        self.probe_availability(start, duration_minutes, buffer_minutes, None)
            .await
    }

    /// Same as `check_availability`, except `event_id` never counts as a conflict.
    /// Used when moving an event within or next to its own slot. Never cached.
    pub async fn check_availability_ignoring(
        &self,
        start: &DateTime<Tz>,
        duration_minutes: u32,
        buffer_minutes: u32,
        event_id: &str,
    ) -> bool {
        self.probe_availability(start, duration_minutes, buffer_minutes, Some(event_id))
            .await
    }

    async fn probe_availability(
        &self,
        start: &DateTime<Tz>,
        duration_minutes: u32,
        buffer_minutes: u32,
        ignore: Option<&str>,
    ) -> bool {
        let buffer = TimeDelta::minutes(i64::from(buffer_minutes));
        let window_start = start.with_timezone(&Utc) - buffer;
        let window_end =
            start.with_timezone(&Utc) + TimeDelta::minutes(i64::from(duration_minutes)) + buffer;

        let key = CacheKey::Availability {
            start: window_start,
            end: window_end,
        };
        if ignore.is_none() {
            if let Some(Cached::Free(free)) = self.cached(&key) {
                tracing::debug!(start = %window_start, free, "availability check (cached)");
                return free;
            }
        }

        self.pace().await;
        match self
            .backend
            .list_events(window_start, window_end, AVAILABILITY_PROBE_LIMIT)
            .await
        {
            Ok(events) => {
                self.mark_health(true);
                let free = !events.iter().any(|e| {
                    e.is_active()
                        && Some(e.id.as_str()) != ignore
                        && e.overlaps(window_start, window_end)
                });
                if ignore.is_none() {
                    self.store(key, Cached::Free(free));
                }
                free
            }
            Err(e) => {
                self.mark_health(false);
                tracing::error!(error = %e, start = %window_start, "error checking availability");
                false
            }
        }
    }

    pub async fn create_event(
        &self,
        summary: &str,
        start: &DateTime<Tz>,
        duration_minutes: u32,
        description: &str,
        attendees: &[String],
        location: &str,
    ) -> Option<CalendarEvent> {
        let start_utc = start.with_timezone(&Utc);
        let end_utc = start_utc + TimeDelta::minutes(i64::from(duration_minutes));
        let footer = format!(
            "\n\n--- Event Details ---\nDuration: {duration_minutes} minutes\nCreated: {} UTC\nCreated by: scheduling assistant",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );

        let new_event = NewEvent {
            summary: summary.to_string(),
            start: start_utc,
            end: end_utc,
            time_zone: start.timezone().name().to_string(),
            description: format!("{description}{footer}"),
            attendees: attendees.to_vec(),
            location: location.to_string(),
        };

        self.pace().await;
        match self.backend.insert_event(new_event).await {
            Ok(event) => {
                self.mark_health(true);
                self.invalidate(start_utc, end_utc);
                tracing::info!(event_id = %event.id, summary, "event created");
                Some(event)
            }
            Err(e) => {
                self.mark_health(false);
                tracing::error!(error = %e, summary, "failed to create event");
                None
            }
        }
    }

    /// Active events starting within `days_ahead` of `from`, soonest first.
    pub async fn get_upcoming_events(
        &self,
        from: DateTime<Utc>,
        limit: usize,
        days_ahead: u32,
    ) -> Vec<CalendarEvent> {
        let start = from.duration_trunc(TimeDelta::minutes(1)).unwrap_or(from);
        let end = start + TimeDelta::days(i64::from(days_ahead));
        let key = CacheKey::Upcoming { start, end, limit };
        if let Some(Cached::Events(events)) = self.cached(&key) {
            return events;
        }

        self.pace().await;
        match self.backend.list_events(start, end, limit).await {
            Ok(mut events) => {
                self.mark_health(true);
                events.retain(|e| e.is_active() && e.end > start);
                events.sort_by_key(|e| e.start);
                events.truncate(limit);
                self.store(key, Cached::Events(events.clone()));
                events
            }
            Err(e) => {
                self.mark_health(false);
                tracing::error!(error = %e, "error fetching upcoming events");
                Vec::new()
            }
        }
    }

    /// Soonest upcoming event in the next week that `reference` points at.
    pub async fn resolve_reference(
        &self,
        reference: &MeetingReference,
        now: &DateTime<Tz>,
    ) -> Option<CalendarEvent> {
        let tz = now.timezone();
        let today = now.date_naive();
        self.get_upcoming_events(now.with_timezone(&Utc), REFERENCE_SCAN_LIMIT, REFERENCE_SCAN_DAYS)
            .await
            .into_iter()
            .find(|event| reference.matches(event, &tz, today))
    }

    pub async fn cancel_event(&self, reference: &MeetingReference, now: &DateTime<Tz>) -> bool {
        let Some(event) = self.resolve_reference(reference, now).await else {
            tracing::warn!(reference = %reference.phrase, "could not find event to cancel");
            return false;
        };

        self.pace().await;
        match self.backend.delete_event(&event.id).await {
            Ok(()) => {
                self.mark_health(true);
                self.invalidate(event.start, event.end);
                tracing::info!(event_id = %event.id, "event cancelled");
                true
            }
            Err(e) => {
                self.mark_health(false);
                tracing::error!(error = %e, event_id = %event.id, "error cancelling event");
                false
            }
        }
    }

    /// Moves the referenced event. Without `new_duration` the original length is kept.
    pub async fn reschedule_event(
        &self,
        reference: &MeetingReference,
        new_start: &DateTime<Tz>,
        new_duration: Option<u32>,
        now: &DateTime<Tz>,
    ) -> bool {
        let Some(event) = self.resolve_reference(reference, now).await else {
            tracing::warn!(reference = %reference.phrase, "could not find event to reschedule");
            return false;
        };

        let length = match new_duration {
            Some(minutes) => TimeDelta::minutes(i64::from(minutes)),
            None => event.end - event.start,
        };
        let mut moved = event.clone();
        moved.start = new_start.with_timezone(&Utc);
        moved.end = moved.start + length;
        moved.description = format!(
            "{}\n\n--- Rescheduled ---\nMoved to: {} UTC\nRescheduled by: scheduling assistant",
            event.description,
            moved.start.format("%Y-%m-%d %H:%M:%S")
        );

        self.pace().await;
        match self.backend.update_event(&moved).await {
            Ok(updated) => {
                self.mark_health(true);
                self.invalidate(event.start, event.end);
                self.invalidate(updated.start, updated.end);
                tracing::info!(event_id = %updated.id, new_start = %updated.start, "event rescheduled");
                true
            }
            Err(e) => {
                self.mark_health(false);
                tracing::error!(error = %e, event_id = %event.id, "error rescheduling event");
                false
            }
        }
    }

    pub async fn get_busy_times(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.pace().await;
        match self.backend.list_events(start, end, AVAILABILITY_PROBE_LIMIT).await {
            Ok(events) => {
                self.mark_health(true);
                events
                    .into_iter()
                    .filter(|e| e.is_active())
                    .map(|e| (e.start, e.end))
                    .collect()
            }
            Err(e) => {
                self.mark_health(false);
                tracing::error!(error = %e, "error getting busy times");
                Vec::new()
            }
        }
    }

    pub async fn stats(&self, now: &DateTime<Tz>) -> CalendarStats {
        let tz = now.timezone();
        let today = now.date_naive();
        let midnight = |date| at_wall_clock(&tz, date, NaiveTime::MIN).map(|d| d.with_timezone(&Utc));

        let week_start = today.checked_sub_days(Days::new(u64::from(
            now.weekday().num_days_from_monday(),
        )));
        let week = week_start.and_then(|monday| {
            let start = midnight(monday)?;
            let end = midnight(monday.checked_add_days(Days::new(7))?)?;
            Some((start, end))
        });
        let total_events_this_week = match week {
            Some((start, end)) => self.get_busy_times(start, end).await.len(),
            None => 0,
        };

        let day = today
            .succ_opt()
            .and_then(|tomorrow| Some((midnight(today)?, midnight(tomorrow)?)));
        let busy_minutes_today = match day {
            Some((start, end)) => self
                .get_busy_times(start, end)
                .await
                .into_iter()
                .map(|(s, e)| (e.min(end) - s.max(start)).num_minutes().max(0))
                .sum(),
            None => 0,
        };

        CalendarStats {
            total_events_this_week,
            busy_minutes_today,
            cached_entries: self.cache.lock().unwrap_or_else(PoisonError::into_inner).len(),
            api_health: if self.healthy.load(Ordering::Relaxed) {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            last_update: Utc::now(),
        }
    }

    /// Drops expired cache entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|_, entry| entry.stored_at.elapsed() < self.cache_ttl);
        before - cache.len()
    }

    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn cached(&self, key: &CacheKey) -> Option<Cached> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.value.clone())
    }

    fn store(&self, key: CacheKey, value: Cached) {
        if self.cache_ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    fn invalidate(&self, start: DateTime<Utc>, end: DateTime<Utc>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|key, _| !key.overlaps(start, end));
    }

    fn mark_health(&self, ok: bool) {
        self.healthy.store(ok, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::memory::InMemoryCalendar;
    use super::*;
    use crate::models::{DayRef, EventStatus, ReferenceTarget};

    fn tz() -> Tz {
        chrono_tz::America::New_York
    }

    // Wednesday
    fn now() -> DateTime<Tz> {
        tz().with_ymd_and_hms(2025, 6, 18, 10, 15, 0).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        tz().with_ymd_and_hms(2025, 6, day, hour, minute, 0).unwrap()
    }

    fn event(id: &str, summary: &str, start: DateTime<Tz>, minutes: i64) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: summary.to_string(),
            start: start.with_timezone(&Utc),
            end: start.with_timezone(&Utc) + TimeDelta::minutes(minutes),
            description: String::new(),
            attendees: vec!["sam@example.com".to_string()],
            location: String::new(),
            status: EventStatus::Confirmed,
            html_link: None,
        }
    }

    struct CountingBackend {
        inner: InMemoryCalendar,
        lists: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl CalendarBackend for CountingBackend {
        async fn list_events(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            limit: usize,
        ) -> anyhow::Result<Vec<CalendarEvent>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("backend unavailable");
            }
            self.inner.list_events(start, end, limit).await
        }

        async fn insert_event(&self, event: NewEvent) -> anyhow::Result<CalendarEvent> {
            if self.fail {
                anyhow::bail!("backend unavailable");
            }
            self.inner.insert_event(event).await
        }

        async fn update_event(&self, event: &CalendarEvent) -> anyhow::Result<CalendarEvent> {
            self.inner.update_event(event).await
        }

        async fn delete_event(&self, id: &str) -> anyhow::Result<()> {
            self.inner.delete_event(id).await
        }
    }

    fn service(events: Vec<CalendarEvent>, ttl_secs: u64) -> (CalendarService, Arc<AtomicUsize>) {
        let lists = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            inner: InMemoryCalendar::with_events(events),
            lists: lists.clone(),
            fail: false,
        };
        let service = CalendarService::new(
            Box::new(backend),
            Duration::from_secs(ttl_secs),
            Duration::ZERO,
        );
        (service, lists)
    }

    #[tokio::test]
    async fn test_availability_detects_overlap() {
        let (calendar, _) = service(vec![event("e1", "Standup", at(19, 14, 0), 30)], 300);
        assert!(!calendar.check_availability(&at(19, 14, 0), 60, 0).await);
        assert!(!calendar.check_availability(&at(19, 13, 30), 60, 0).await);
        // Back to back is fine.
        assert!(calendar.check_availability(&at(19, 14, 30), 60, 0).await);
        assert!(calendar.check_availability(&at(19, 13, 0), 60, 0).await);
        // A buffer widens the probed window.
        assert!(!calendar.check_availability(&at(19, 13, 0), 60, 15).await);
    }

    #[tokio::test]
    async fn test_availability_ignoring_own_slot() {
        let (calendar, lists) = service(
            vec![
                event("e1", "Budget review", at(19, 15, 0), 60),
                event("e2", "Standup", at(19, 17, 0), 15),
            ],
            300,
        );
        assert!(!calendar.check_availability(&at(19, 15, 30), 60, 0).await);
        assert!(calendar.check_availability_ignoring(&at(19, 15, 30), 60, 0, "e1").await);
        // Other events still conflict.
        assert!(!calendar.check_availability_ignoring(&at(19, 16, 30), 60, 0, "e1").await);
        // The cached busy answer does not leak into the ignoring probe.
        assert_eq!(lists.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_availability_is_cached_until_mutation() {
        let (calendar, lists) = service(Vec::new(), 300);
        assert!(calendar.check_availability(&at(19, 14, 0), 60, 0).await);
        assert!(calendar.check_availability(&at(19, 14, 0), 60, 0).await);
        assert_eq!(lists.load(Ordering::SeqCst), 1);

        let created = calendar
            .create_event("Call", &at(19, 14, 30), 30, "", &[], "")
            .await;
        assert!(created.is_some());
        assert!(!calendar.check_availability(&at(19, 14, 0), 60, 0).await);
        assert_eq!(lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mutation_keeps_unrelated_cache_entries() {
        let (calendar, lists) = service(Vec::new(), 300);
        calendar.check_availability(&at(19, 9, 0), 60, 0).await;
        calendar.check_availability(&at(20, 9, 0), 60, 0).await;
        calendar.create_event("Call", &at(19, 9, 0), 30, "", &[], "").await;

        calendar.check_availability(&at(20, 9, 0), 60, 0).await;
        assert_eq!(lists.load(Ordering::SeqCst), 2);
        calendar.check_availability(&at(19, 9, 0), 60, 0).await;
        assert_eq!(lists.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let (calendar, lists) = service(Vec::new(), 0);
        calendar.check_availability(&at(19, 14, 0), 60, 0).await;
        calendar.check_availability(&at(19, 14, 0), 60, 0).await;
        assert_eq!(lists.load(Ordering::SeqCst), 2);
        assert_eq!(calendar.cleanup_expired(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_fail_soft() {
        let backend = CountingBackend {
            inner: InMemoryCalendar::default(),
            lists: Arc::new(AtomicUsize::new(0)),
            fail: true,
        };
        let calendar = CalendarService::new(Box::new(backend), Duration::from_secs(300), Duration::ZERO);
        assert!(!calendar.check_availability(&at(19, 14, 0), 60, 0).await);
        assert!(calendar.get_upcoming_events(now().with_timezone(&Utc), 10, 30).await.is_empty());
        assert!(calendar.create_event("Call", &at(19, 14, 0), 30, "", &[], "").await.is_none());
        assert!(calendar.get_busy_times(now().with_timezone(&Utc), at(25, 0, 0).with_timezone(&Utc)).await.is_empty());
        assert_eq!(calendar.stats(&now()).await.api_health, "degraded");
    }

    #[tokio::test]
    async fn test_create_event_appends_footer() {
        let (calendar, _) = service(Vec::new(), 300);
        let created = calendar
            .create_event("Review", &at(19, 11, 0), 45, "Q3 numbers", &["a@example.com".to_string()], "Room 4")
            .await
            .unwrap();
        assert!(created.description.starts_with("Q3 numbers"));
        assert!(created.description.contains("Duration: 45 minutes"));
        assert_eq!(created.duration_minutes(), 45);
        assert_eq!(created.location, "Room 4");
    }

    #[tokio::test]
    async fn test_upcoming_events_sorted_and_limited() {
        let (calendar, _) = service(
            vec![
                event("late", "Later", at(20, 15, 0), 30),
                event("soon", "Sooner", at(19, 9, 0), 30),
                event("past", "Earlier", at(17, 9, 0), 30),
            ],
            300,
        );
        let events = calendar.get_upcoming_events(now().with_timezone(&Utc), 10, 30).await;
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "late"]);

        let events = calendar.get_upcoming_events(now().with_timezone(&Utc), 1, 30).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_by_reference() {
        let (calendar, _) = service(
            vec![
                event("a", "Budget review", at(19, 15, 0), 60),
                event("b", "Team sync", at(20, 15, 0), 60),
            ],
            300,
        );
        let reference = MeetingReference {
            phrase: "friday".to_string(),
            target: ReferenceTarget::Day(DayRef::Weekday(chrono::Weekday::Fri)),
        };
        assert!(calendar.cancel_event(&reference, &now()).await);
        let remaining = calendar.get_upcoming_events(now().with_timezone(&Utc), 10, 30).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "a");

        assert!(!calendar.cancel_event(&reference, &now()).await);
    }

    #[tokio::test]
    async fn test_reschedule_keeps_length_unless_given() {
        let (calendar, _) = service(vec![event("a", "Budget review", at(19, 15, 0), 45)], 300);
        let reference = MeetingReference {
            phrase: "budget meeting".to_string(),
            target: ReferenceTarget::Title("budget".to_string()),
        };
        assert!(calendar.reschedule_event(&reference, &at(20, 10, 0), None, &now()).await);
        let events = calendar.get_upcoming_events(now().with_timezone(&Utc), 10, 30).await;
        assert_eq!(events[0].start, at(20, 10, 0).with_timezone(&Utc));
        assert_eq!(events[0].duration_minutes(), 45);
        assert!(events[0].description.contains("Rescheduled"));

        assert!(calendar.reschedule_event(&reference, &at(20, 11, 0), Some(90), &now()).await);
        let events = calendar.get_upcoming_events(now().with_timezone(&Utc), 10, 30).await;
        assert_eq!(events[0].duration_minutes(), 90);
    }

    #[tokio::test]
    async fn test_stats() {
        let (calendar, _) = service(
            vec![
                event("a", "Early", at(18, 8, 0), 30),
                event("b", "Late", at(18, 16, 0), 60),
                event("c", "Friday", at(20, 9, 0), 30),
                event("d", "Next week", at(24, 9, 0), 30),
            ],
            300,
        );
        let stats = calendar.stats(&now()).await;
        assert_eq!(stats.total_events_this_week, 3);
        assert_eq!(stats.busy_minutes_today, 90);
        assert_eq!(stats.api_health, "healthy");
    }
}
