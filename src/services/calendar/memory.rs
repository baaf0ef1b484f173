use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::CalendarBackend;
use crate::models::{CalendarEvent, EventStatus, NewEvent};

/// Process-local calendar for development and tests.
#[derive(Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }
}

#[async_trait]
impl CalendarBackend for InMemoryCalendar {
    async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        let events = self.events.read().await;
        let mut matching: Vec<_> = events
            .iter()
            .filter(|e| e.is_active() && e.overlaps(start, end))
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.start);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn insert_event(&self, event: NewEvent) -> anyhow::Result<CalendarEvent> {
        anyhow::ensure!(event.end > event.start, "event must end after it starts");
        let created = CalendarEvent {
            id: uuid::Uuid::new_v4().to_string(),
            summary: event.summary,
            start: event.start,
            end: event.end,
            description: event.description,
            attendees: event.attendees,
            location: event.location,
            status: EventStatus::Confirmed,
            html_link: None,
        };
        self.events.write().await.push(created.clone());
        Ok(created)
    }

    async fn update_event(&self, event: &CalendarEvent) -> anyhow::Result<CalendarEvent> {
        let mut events = self.events.write().await;
        let existing = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| anyhow::anyhow!("event {} not found", event.id))?;
        *existing = event.clone();
        Ok(event.clone())
    }

    async fn delete_event(&self, id: &str) -> anyhow::Result<()> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.id != id);
        anyhow::ensure!(events.len() < before, "event {id} not found");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn new_event(hour: u32) -> NewEvent {
        let start = Utc.with_ymd_and_hms(2025, 6, 19, hour, 0, 0).unwrap();
        NewEvent {
            summary: "Call".to_string(),
            start,
            end: start + TimeDelta::minutes(30),
            time_zone: "UTC".to_string(),
            description: String::new(),
            attendees: Vec::new(),
            location: String::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_list_delete() {
        let calendar = InMemoryCalendar::new();
        let late = calendar.insert_event(new_event(15)).await.unwrap();
        let early = calendar.insert_event(new_event(9)).await.unwrap();
        assert_ne!(late.id, early.id);

        let day_start = Utc.with_ymd_and_hms(2025, 6, 19, 0, 0, 0).unwrap();
        let day_end = day_start + TimeDelta::days(1);
        let listed = calendar.list_events(day_start, day_end, 10).await.unwrap();
        assert_eq!(listed[0].id, early.id);
        assert_eq!(listed[1].id, late.id);

        calendar.delete_event(&early.id).await.unwrap();
        assert!(calendar.delete_event(&early.id).await.is_err());
        assert_eq!(calendar.list_events(day_start, day_end, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_events_are_hidden() {
        let calendar = InMemoryCalendar::new();
        let mut event = calendar.insert_event(new_event(9)).await.unwrap();
        event.status = EventStatus::Cancelled;
        calendar.update_event(&event).await.unwrap();

        let day_start = Utc.with_ymd_and_hms(2025, 6, 19, 0, 0, 0).unwrap();
        let listed = calendar
            .list_events(day_start, day_start + TimeDelta::days(1), 10)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_event_fails() {
        let calendar = InMemoryCalendar::new();
        let mut event = calendar.insert_event(new_event(9)).await.unwrap();
        event.id = "missing".to_string();
        assert!(calendar.update_event(&event).await.is_err());
    }
}
