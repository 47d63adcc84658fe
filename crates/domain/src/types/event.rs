//! Calendar events as fetched from the provider and as stored locally

use serde::{Deserialize, Serialize};

/// Provider-side event status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    /// Deleted upstream. Applied as a soft delete.
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a provider status string; unknown values count as confirmed.
    pub fn from_provider(value: &str) -> Self {
        match value {
            "cancelled" => Self::Cancelled,
            "tentative" => Self::Tentative,
            _ => Self::Confirmed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// One event from a provider fetch.
///
/// Cancelled events in an incremental fetch often carry only the id and
/// status, so every descriptive field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub provider_event_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Epoch seconds.
    pub start_time: Option<i64>,
    /// Epoch seconds.
    pub end_time: Option<i64>,
    pub is_all_day: bool,
    pub status: EventStatus,
    pub recurrence: Option<String>,
    pub attendees: Option<String>,
    pub etag: Option<String>,
    /// Provider payload as received.
    pub raw_data: String,
}

impl ProviderEvent {
    /// Minimal event with the given id and status; the rest left empty.
    pub fn new(provider_event_id: impl Into<String>, status: EventStatus) -> Self {
        Self {
            provider_event_id: provider_event_id.into(),
            title: None,
            description: None,
            location: None,
            start_time: None,
            end_time: None,
            is_all_day: false,
            status,
            recurrence: None,
            attendees: None,
            etag: None,
            raw_data: "{}".to_string(),
        }
    }
}

/// A materialized event row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub calendar_id: String,
    pub provider_event_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub is_all_day: bool,
    pub status: EventStatus,
    pub recurrence: Option<String>,
    pub attendees: Option<String>,
    pub etag: Option<String>,
    #[serde(skip_serializing)]
    pub raw_data: String,
    /// Set when the provider reported the event cancelled.
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StoredEvent {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Whether an upsert inserted a new row or touched an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// One page of a provider event listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPage {
    pub events: Vec<ProviderEvent>,
    pub next_page_token: Option<String>,
    /// Only present on the final page.
    pub next_sync_token: Option<String>,
}

/// All pages of one fetch, flattened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub events: Vec<ProviderEvent>,
    pub next_sync_token: Option<String>,
}
