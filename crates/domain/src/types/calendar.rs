//! Tracked calendars, their sync cursor and webhook channel state

use serde::{Deserialize, Serialize};

use super::account::CredentialOwner;

/// Provider name stored on Google-backed rows.
pub const PROVIDER_GOOGLE: &str = "google";

/// An active push-notification subscription for one calendar.
///
/// The three fields are persisted together; a calendar either has all of
/// them or none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookChannel {
    pub channel_id: String,
    pub resource_id: String,
    /// Epoch seconds.
    pub expires_at: i64,
}

impl WebhookChannel {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// A provider calendar selected for syncing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub account_id: String,
    /// `None` means the calendar belongs to the primary account.
    pub connected_account_id: Option<String>,
    pub provider: String,
    pub provider_calendar_id: String,
    pub name: String,
    pub color: Option<String>,
    pub is_primary: bool,
    pub is_active: bool,
    /// Opaque incremental-fetch cursor. `None` forces a full resync.
    pub sync_token: Option<String>,
    pub webhook: Option<WebhookChannel>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Calendar {
    pub fn credential_owner(&self) -> CredentialOwner {
        match &self.connected_account_id {
            Some(id) => CredentialOwner::ConnectedAccount(id.clone()),
            None => CredentialOwner::Account(self.account_id.clone()),
        }
    }

    pub fn cursor(&self) -> SyncCursor {
        if self.sync_token.is_some() {
            SyncCursor::Synced
        } else {
            SyncCursor::Unsynced
        }
    }

    pub fn channel_state(&self, now: i64, margin_secs: i64) -> ChannelState {
        match &self.webhook {
            None => ChannelState::NoChannel,
            Some(channel) if is_due_for_renewal(channel.expires_at, now, margin_secs) => {
                ChannelState::Expiring
            }
            Some(_) => ChannelState::Active,
        }
    }
}

/// Sync cursor state of a calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCursor {
    Unsynced,
    Synced,
}

/// Webhook channel state of a calendar.
///
/// `Expiring` is derived from the stored expiry and also covers channels
/// that have already lapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    NoChannel,
    Active,
    Expiring,
}

/// Whether a channel expiring at `expires_at` should be renewed at `now`.
///
/// Eligible once `now > expires_at - margin`, i.e. strictly inside the
/// margin window.
pub fn is_due_for_renewal(expires_at: i64, now: i64, margin_secs: i64) -> bool {
    now > expires_at.saturating_sub(margin_secs)
}

/// Input for tracking a calendar
#[derive(Debug, Clone, Deserialize)]
pub struct NewCalendar {
    pub account_id: String,
    #[serde(default)]
    pub connected_account_id: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub provider_calendar_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_provider() -> String {
    PROVIDER_GOOGLE.to_string()
}

/// A calendar visible to a credential, as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableCalendar {
    pub provider_calendar_id: String,
    pub name: String,
    pub color: Option<String>,
    pub is_primary: bool,
}

/// Provider acknowledgement of a new watch channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRegistration {
    pub resource_id: String,
    /// Epoch seconds.
    pub expires_at: i64,
}
