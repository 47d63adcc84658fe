//! Google Calendar API wire types and their conversion into domain types.

use calsync_domain::{AvailableCalendar, CalSyncError, EventStatus, ProviderEvent, Result};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsResponse {
    /// Kept untyped so each event's payload can be stored verbatim.
    #[serde(default)]
    pub items: Vec<Value>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
    /// Google sends explicit nulls for cleared lists.
    #[serde(default)]
    recurrence: Option<Vec<String>>,
    #[serde(default)]
    attendees: Option<Vec<Value>>,
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventDateTime {
    fn is_all_day(&self) -> bool {
        self.date_time.is_none() && self.date.is_some()
    }

    /// Epoch seconds; all-day dates resolve to midnight UTC.
    fn epoch_seconds(&self, event_id: &str) -> Option<i64> {
        if let Some(raw) = &self.date_time {
            return match DateTime::parse_from_rfc3339(raw) {
                Ok(parsed) => Some(parsed.timestamp()),
                Err(err) => {
                    warn!(event_id, value = %raw, error = %err, "unparseable event dateTime");
                    None
                }
            };
        }

        let raw = self.date.as_ref()?;
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc().timestamp()),
            Err(err) => {
                warn!(event_id, value = %raw, error = %err, "unparseable event date");
                None
            }
        }
    }
}

/// Convert one `items[]` entry.
///
/// A payload that does not match the event shape fails the whole page, so
/// the caller never advances its sync token past an event it could not store.
pub(crate) fn convert_event(item: Value) -> Result<ProviderEvent> {
    let raw_data = item.to_string();
    let label = item.get("id").and_then(Value::as_str).unwrap_or("<no id>").to_string();
    let event: GoogleEvent = serde_json::from_value(item).map_err(|err| {
        CalSyncError::Internal(format!("malformed event {label}: {err}"))
    })?;

    let id = event.id;
    let status = event.status.as_deref().map(EventStatus::from_provider).unwrap_or_default();
    let start_time = event.start.as_ref().and_then(|start| start.epoch_seconds(&id));
    let end_time = event.end.as_ref().and_then(|end| end.epoch_seconds(&id));
    let is_all_day = event.start.as_ref().is_some_and(EventDateTime::is_all_day);

    let recurrence = event
        .recurrence
        .filter(|rules| !rules.is_empty())
        .and_then(|rules| serde_json::to_string(&rules).ok());
    let attendees = event
        .attendees
        .filter(|list| !list.is_empty())
        .map(|list| Value::Array(list).to_string());

    Ok(ProviderEvent {
        provider_event_id: id,
        title: event.summary.filter(|s| !s.trim().is_empty()),
        description: event.description,
        location: event.location,
        start_time,
        end_time,
        is_all_day,
        status,
        recurrence,
        attendees,
        etag: event.etag,
        raw_data,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListEntry {
    id: String,
    summary: Option<String>,
    summary_override: Option<String>,
    background_color: Option<String>,
    #[serde(default)]
    primary: bool,
}

impl From<CalendarListEntry> for AvailableCalendar {
    fn from(entry: CalendarListEntry) -> Self {
        let name = entry.summary_override.or(entry.summary).unwrap_or_else(|| entry.id.clone());
        Self {
            provider_calendar_id: entry.id,
            name,
            color: entry.background_color,
            is_primary: entry.primary,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchRequest<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<WatchParams>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchParams {
    /// Seconds, as a string.
    pub ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchResponse {
    pub resource_id: Option<String>,
    /// Epoch milliseconds, as a string.
    pub expiration: Option<String>,
}

impl WatchResponse {
    pub fn expires_at_secs(&self) -> Option<i64> {
        self.expiration.as_deref()?.trim().parse::<i64>().ok().map(|ms| ms / 1_000)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StopRequest<'a> {
    pub id: &'a str,
    pub resource_id: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenErrorResponse {
    #[serde(default)]
    pub error: String,
    pub error_description: Option<String>,
}
