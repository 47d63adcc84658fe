//! Calendar sync port interfaces
//!
//! Implemented by `calsync-infra` (SQLite, Google) and by in-memory fakes
//! in tests.

use std::time::Duration;

use async_trait::async_trait;
use calsync_domain::{
    AvailableCalendar, Calendar, CredentialOwner, Credentials, EventPage, ProviderEvent,
    RefreshedToken, Result, UpsertOutcome, WatchRegistration, WebhookChannel,
};

/// Remote calendar API.
///
/// Implementations report a rejected access token as
/// `CalSyncError::Unauthorized`; the refresh decorator turns that into a
/// refresh-and-retry.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Calendars visible to the credential
    async fn list_calendars(&self, access_token: &str) -> Result<Vec<AvailableCalendar>>;

    /// Fetch one page of events, including cancelled ones.
    ///
    /// With `sync_token` the page is a delta since that token; without it
    /// the listing is full. Fails with `SyncTokenExpired` when the
    /// provider no longer accepts the token.
    async fn fetch_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        sync_token: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<EventPage>;

    /// Create a push-notification channel. Non-2xx responses fail with
    /// `WatchRegistrationFailed`.
    async fn register_watch(
        &self,
        access_token: &str,
        calendar_id: &str,
        channel_id: &str,
        callback_address: &str,
        ttl: Option<Duration>,
    ) -> Result<WatchRegistration>;

    /// Stop delivering notifications for a channel
    async fn stop_watch(&self, access_token: &str, channel_id: &str, resource_id: &str)
        -> Result<()>;

    /// Exchange a refresh token. A revoked token fails with
    /// `CredentialsExpired`.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

/// Tracked calendars and their materialized events
#[async_trait]
pub trait CalendarRegistry: Send + Sync {
    async fn get_calendar(&self, id: &str) -> Result<Option<Calendar>>;

    /// Active calendar whose stored channel has this resource id
    async fn get_calendar_by_webhook_resource_id(
        &self,
        resource_id: &str,
    ) -> Result<Option<Calendar>>;

    /// Active calendars with no channel or a channel expiring before
    /// `deadline` (epoch seconds, exclusive)
    async fn list_calendars_due_for_renewal(&self, deadline: i64) -> Result<Vec<Calendar>>;

    async fn update_sync_token(&self, id: &str, sync_token: &str) -> Result<()>;

    async fn clear_sync_token(&self, id: &str) -> Result<()>;

    /// Overwrite channel id, resource id and expiry in one row update
    async fn update_webhook_channel(&self, id: &str, channel: &WebhookChannel) -> Result<()>;

    async fn clear_webhook_channel(&self, id: &str) -> Result<()>;

    /// Insert or update by (calendar id, provider event id). Cancelled
    /// events are soft-deleted, never removed.
    async fn upsert_event(&self, calendar_id: &str, event: &ProviderEvent)
        -> Result<UpsertOutcome>;
}

/// OAuth credentials for accounts and connected accounts
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_credentials(&self, owner: &CredentialOwner) -> Result<Option<Credentials>>;

    /// Store a new access token. `refresh_token` of `None` keeps the
    /// current one; `expires_at` is written as given.
    async fn update_credentials(
        &self,
        owner: &CredentialOwner,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()>;
}

/// Downstream consumer of changed events
#[async_trait]
pub trait EventForwarder: Send + Sync {
    async fn forward(&self, calendar: &Calendar, events: &[ProviderEvent]) -> Result<()>;
}

/// Forwarder used when no downstream consumer is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopForwarder;

#[async_trait]
impl EventForwarder for NoopForwarder {
    async fn forward(&self, _calendar: &Calendar, _events: &[ProviderEvent]) -> Result<()> {
        Ok(())
    }
}
