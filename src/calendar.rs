//! Calendar provider integration — free/busy, timezone setting, event insert.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// Google Calendar REST base.
const CALENDAR_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Free/busy lookahead window in days.
const FREE_BUSY_DAYS_AHEAD: i64 = 30;

/// One busy interval on the user's primary calendar.
#[derive(Debug, Clone, Deserialize)]
pub struct BusySlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Details for an event to insert, as extracted from a call summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub title: String,
    /// ISO 8601 start time.
    pub start_time: String,
    /// ISO 8601 end time.
    pub end_time: String,
    /// IANA timezone name.
    pub time_zone: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Seam over the calendar provider.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy intervals on the primary calendar over the lookahead window.
    async fn free_busy(&self) -> Result<Vec<BusySlot>, CalendarError>;

    /// The user's configured timezone, if set.
    async fn timezone(&self) -> Result<Option<String>, CalendarError>;

    /// Insert an event on the primary calendar, returning its link.
    async fn insert_event(&self, event: &EventDetails) -> Result<String, CalendarError>;
}

/// Google Calendar REST client bound to one user's access token.
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(http: reqwest::Client, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "Calendar API error");
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    calendars: FreeBusyCalendars,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendars {
    primary: FreeBusyEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FreeBusyEntry {
    busy: Vec<BusySlot>,
}

#[derive(Debug, Deserialize)]
struct SettingResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResponse {
    html_link: String,
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn free_busy(&self) -> Result<Vec<BusySlot>, CalendarError> {
        let now = Utc::now();
        let body = serde_json::json!({
            "timeMin": now.to_rfc3339(),
            "timeMax": (now + Duration::days(FREE_BUSY_DAYS_AHEAD)).to_rfc3339(),
            "items": [{"id": "primary"}],
        });

        let response = self
            .http
            .post(format!("{CALENDAR_BASE}/freeBusy"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;

        let parsed: FreeBusyResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;
        Ok(parsed.calendars.primary.busy)
    }

    async fn timezone(&self) -> Result<Option<String>, CalendarError> {
        let response = self
            .http
            .get(format!("{CALENDAR_BASE}/users/me/settings/timezone"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;

        let setting: SettingResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;
        Ok(Some(setting.value))
    }

    async fn insert_event(&self, event: &EventDetails) -> Result<String, CalendarError> {
        let body = serde_json::json!({
            "summary": event.title,
            "description": event
                .description
                .as_deref()
                .unwrap_or("Scheduled by Timely Agent."),
            "start": {"dateTime": event.start_time, "timeZone": event.time_zone},
            "end": {"dateTime": event.end_time, "timeZone": event.time_zone},
        });

        let response = self
            .http
            .post(format!("{CALENDAR_BASE}/calendars/primary/events"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;

        let inserted: InsertResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| CalendarError::Request(e.to_string()))?;
        Ok(inserted.html_link)
    }
}

/// Render busy slots into a sentence for the persona prompt.
///
/// Times are stated in UTC; the timezone sentence tells the model how to
/// translate for the user.
pub fn format_busy_slots(slots: &[BusySlot], time_zone: Option<&str>) -> String {
    if slots.is_empty() {
        return "The user's calendar is completely open.".to_string();
    }

    let listed: Vec<String> = slots
        .iter()
        .map(|slot| {
            format!(
                "from {} to {} UTC on {}",
                slot.start.format("%H:%M"),
                slot.end.format("%H:%M"),
                slot.start.format("%Y-%m-%d"),
            )
        })
        .collect();

    let tz = time_zone.unwrap_or("unknown");
    format!(
        "The user's timezone is {tz}. They are busy during these times: {}.",
        listed.join("; ")
    )
}
