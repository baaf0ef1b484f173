//! Google Calendar v3 REST backend.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::CalendarBackend;
use crate::models::{CalendarEvent, EventStatus, NewEvent};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

pub struct GoogleCalendar {
    base_url: String,
    calendar_id: String,
    access_token: String,
    client: reqwest::Client,
}

impl GoogleCalendar {
    pub fn new(calendar_id: String, access_token: String) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), calendar_id, access_token)
    }

    pub fn with_base_url(base_url: String, calendar_id: String, access_token: String) -> Self {
        Self {
            base_url,
            calendar_id,
            access_token,
            client: reqwest::Client::new(),
        }
    }

    fn events_url(&self, event_id: Option<&str>) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.base_url).context("invalid calendar base URL")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("calendar base URL cannot carry a path"))?;
            segments
                .pop_if_empty()
                .extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl EventTime {
    fn at(instant: DateTime<Utc>, time_zone: Option<&str>) -> Self {
        Self {
            date_time: Some(instant.fixed_offset()),
            date: None,
            time_zone: time_zone.map(str::to_string),
        }
    }

    /// All-day events start at midnight UTC.
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match (self.date_time, self.date) {
            (Some(dt), _) => Some(dt.with_timezone(&Utc)),
            (None, Some(date)) => date.and_hms_opt(0, 0, 0).map(|d| d.and_utc()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Attendee {
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start: EventTime,
    #[serde(default)]
    end: EventTime,
    #[serde(default)]
    attendees: Vec<Attendee>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    html_link: Option<String>,
}

impl GoogleEvent {
    fn into_event(self) -> Option<CalendarEvent> {
        let start = self.start.to_utc()?;
        let end = self.end.to_utc()?;
        Some(CalendarEvent {
            id: self.id,
            summary: self.summary.unwrap_or_else(|| "No title".to_string()),
            start,
            end,
            description: self.description.unwrap_or_default(),
            attendees: self.attendees.into_iter().map(|a| a.email).collect(),
            location: self.location.unwrap_or_default(),
            status: self
                .status
                .as_deref()
                .map(EventStatus::parse)
                .unwrap_or_default(),
            html_link: self.html_link,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

fn into_events(items: Vec<GoogleEvent>) -> Vec<CalendarEvent> {
    items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.clone();
            let event = item.into_event();
            if event.is_none() {
                tracing::warn!(event_id = %id, "skipping event without usable start/end");
            }
            event
        })
        .collect()
}

#[async_trait]
impl CalendarBackend for GoogleCalendar {
    async fn list_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        let url = self.events_url(None)?;
        let data: EventList = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", start.to_rfc3339()),
                ("timeMax", end.to_rfc3339()),
                ("maxResults", limit.max(1).to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .context("failed to call Google Calendar events.list")?
            .error_for_status()
            .context("Google Calendar events.list returned error")?
            .json()
            .await
            .context("failed to parse Google Calendar event list")?;

        Ok(into_events(data.items))
    }

    async fn insert_event(&self, event: NewEvent) -> anyhow::Result<CalendarEvent> {
        let mut body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": EventTime::at(event.start, Some(&event.time_zone)),
            "end": EventTime::at(event.end, Some(&event.time_zone)),
            "status": "confirmed",
        });
        if !event.location.is_empty() {
            body["location"] = json!(event.location);
        }
        if !event.attendees.is_empty() {
            body["attendees"] = event
                .attendees
                .iter()
                .map(|email| json!({ "email": email }))
                .collect();
        }

        let created: GoogleEvent = self
            .client
            .post(self.events_url(None)?)
            .bearer_auth(&self.access_token)
            .query(&[("sendUpdates", "all")])
            .json(&body)
            .send()
            .await
            .context("failed to call Google Calendar events.insert")?
            .error_for_status()
            .context("Google Calendar events.insert returned error")?
            .json()
            .await
            .context("failed to parse created event")?;

        created
            .into_event()
            .ok_or_else(|| anyhow::anyhow!("created event has no usable start/end"))
    }

    async fn update_event(&self, event: &CalendarEvent) -> anyhow::Result<CalendarEvent> {
        let body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": EventTime::at(event.start, None),
            "end": EventTime::at(event.end, None),
        });

        let updated: GoogleEvent = self
            .client
            .patch(self.events_url(Some(&event.id))?)
            .bearer_auth(&self.access_token)
            .query(&[("sendUpdates", "all")])
            .json(&body)
            .send()
            .await
            .context("failed to call Google Calendar events.patch")?
            .error_for_status()
            .context("Google Calendar events.patch returned error")?
            .json()
            .await
            .context("failed to parse updated event")?;

        updated
            .into_event()
            .ok_or_else(|| anyhow::anyhow!("updated event has no usable start/end"))
    }

    async fn delete_event(&self, id: &str) -> anyhow::Result<()> {
        self.client
            .delete(self.events_url(Some(id))?)
            .bearer_auth(&self.access_token)
            .query(&[("sendUpdates", "all")])
            .send()
            .await
            .context("failed to call Google Calendar events.delete")?
            .error_for_status()
            .context("Google Calendar events.delete returned error")?;
        Ok(())
    }
}
