//! Explicit results of sync, renewal and notification operations

use serde::{Deserialize, Serialize};

use super::calendar::WebhookChannel;
use super::event::{EventStatus, UpsertOutcome};
use crate::CalSyncError;

/// Counts produced by one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub calendar_id: String,
    pub created: u32,
    pub updated: u32,
    pub cancelled: u32,
    /// The pass listed every event instead of fetching a delta.
    pub full_sync: bool,
    /// The stored token was rejected and discarded during this pass.
    pub recovered_from_expired_token: bool,
    pub next_sync_token: Option<String>,
}

impl SyncSummary {
    pub fn new(calendar_id: impl Into<String>) -> Self {
        Self { calendar_id: calendar_id.into(), ..Self::default() }
    }

    /// Count one applied event. Cancellations are counted on their own.
    pub fn record(&mut self, status: EventStatus, outcome: UpsertOutcome) {
        if status.is_cancelled() {
            self.cancelled += 1;
            return;
        }
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.created + self.updated + self.cancelled
    }
}

/// Why an operation did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CalendarNotFound,
    CalendarInactive,
    CredentialsNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced(SyncSummary),
    Skipped { reason: SkipReason },
}

impl SyncOutcome {
    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            Self::Synced(summary) => Some(summary),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenewalOutcome {
    Renewed(WebhookChannel),
    /// The current channel is outside the renewal margin.
    NotDue { expires_at: i64 },
    Skipped { reason: SkipReason },
}

/// One calendar that could not be renewed during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalFailure {
    pub calendar_id: String,
    pub error: CalSyncError,
}

/// Result of one scheduled renewal pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalReport {
    pub examined: u32,
    pub renewed: u32,
    pub skipped: u32,
    pub failures: Vec<RenewalFailure>,
}

/// Identifying data of an inbound push notification.
///
/// Notifications carry no event data; they only say "something changed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookNotification {
    pub resource_id: String,
    pub channel_id: Option<String>,
    /// `sync` for the handshake after registration, `exists` for changes.
    pub resource_state: Option<String>,
    pub message_number: Option<u64>,
}

impl WebhookNotification {
    pub fn for_resource(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            channel_id: None,
            resource_state: None,
            message_number: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    UnknownResource,
    StaleChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Ignored { reason: IgnoreReason },
    Synced { calendar_id: String, sync: SyncOutcome },
}
