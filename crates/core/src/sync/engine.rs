//! Sync engine: reconciles a provider's event delta stream into the
//! calendar registry.
//!
//! A calendar's cursor is either unsynced (no token) or synced. A rejected
//! token sends it back to unsynced and triggers exactly one full resync in
//! the same pass. The new token is stored only after every event of the
//! batch has been applied, so an interrupted pass is replayed from the
//! previous token and the idempotent upsert absorbs the duplicates.

use std::sync::Arc;
use std::time::Duration;

use calsync_domain::{
    AvailableCalendar, CalSyncError, Calendar, CredentialOwner, Credentials, ProviderEvent,
    Result, SkipReason, SyncCursor, SyncOutcome, SyncSummary,
};
use tracing::{debug, info, instrument, warn};

use super::credentials::{RefreshingClient, DEFAULT_REFRESH_SKEW};
use crate::calendar_ports::{
    CalendarProvider, CalendarRegistry, EventForwarder, NoopForwarder, TokenStore,
};
use crate::clock::{Clock, SystemClock};

/// Engine tunables
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Channels within this window of their expiry are renewed.
    pub renewal_margin: Duration,
    /// Address the provider posts notifications to. Required for renewals.
    pub callback_address: Option<String>,
    pub channel_ttl: Option<Duration>,
    /// Access tokens this close to expiry are refreshed before use.
    pub refresh_skew: Duration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            renewal_margin: Duration::from_secs(15 * 60),
            callback_address: None,
            channel_ttl: None,
            refresh_skew: DEFAULT_REFRESH_SKEW,
        }
    }
}

/// Drives sync passes, channel renewals and notification handling over the
/// registry and provider ports.
pub struct SyncEngine {
    pub(super) registry: Arc<dyn CalendarRegistry>,
    pub(super) token_store: Arc<dyn TokenStore>,
    pub(super) client: RefreshingClient,
    pub(super) forwarder: Arc<dyn EventForwarder>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: SyncEngineConfig,
}

/// A calendar that can be worked on, or the reason it cannot.
pub(super) enum Target {
    Ready(Calendar, Credentials),
    Skip(SkipReason),
}

impl SyncEngine {
    /// Create a new engine on the system clock with a no-op forwarder.
    pub fn new(
        registry: Arc<dyn CalendarRegistry>,
        token_store: Arc<dyn TokenStore>,
        provider: Arc<dyn CalendarProvider>,
        config: SyncEngineConfig,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let client = RefreshingClient::new(provider, Arc::clone(&token_store))
            .with_clock(Arc::clone(&clock))
            .with_refresh_skew(config.refresh_skew);
        Self {
            registry,
            token_store,
            client,
            forwarder: Arc::new(NoopForwarder),
            clock,
            config,
        }
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.client = self.client.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Forward each synced batch downstream.
    pub fn with_forwarder(mut self, forwarder: Arc<dyn EventForwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// Run one sync pass for a calendar.
    ///
    /// Missing or inactive calendars, and calendars whose owner has no
    /// stored credentials, are skipped rather than reported as errors.
    ///
    /// # Errors
    /// Any provider or registry failure other than the first
    /// `SyncTokenExpired` aborts the pass with the stored token untouched.
    #[instrument(skip(self))]
    pub async fn sync_calendar(&self, calendar_id: &str) -> Result<SyncOutcome> {
        let (calendar, mut credentials) = match self.load_target(calendar_id).await? {
            Target::Ready(calendar, credentials) => (calendar, credentials),
            Target::Skip(reason) => {
                debug!(?reason, "sync skipped");
                return Ok(SyncOutcome::Skipped { reason });
            }
        };

        let mut summary = SyncSummary::new(&calendar.id);
        let mut sync_token = calendar.sync_token.clone();
        summary.full_sync = calendar.cursor() == SyncCursor::Unsynced;

        let batch = loop {
            let fetched = self
                .client
                .fetch_events(&mut credentials, &calendar.provider_calendar_id, sync_token.as_deref())
                .await;
            match fetched {
                Ok(batch) => break batch,
                Err(CalSyncError::SyncTokenExpired(reason))
                    if !summary.recovered_from_expired_token =>
                {
                    warn!(%reason, "sync token rejected, falling back to full resync");
                    self.registry.clear_sync_token(&calendar.id).await?;
                    sync_token = None;
                    summary.full_sync = true;
                    summary.recovered_from_expired_token = true;
                }
                Err(err) => return Err(err),
            }
        };

        for event in &batch.events {
            let outcome = self.registry.upsert_event(&calendar.id, event).await?;
            summary.record(event.status, outcome);
        }

        match batch.next_sync_token {
            Some(token) => {
                self.registry.update_sync_token(&calendar.id, &token).await?;
                summary.next_sync_token = Some(token);
            }
            None => {
                warn!("provider returned no sync token, keeping the previous one");
                summary.next_sync_token = sync_token;
            }
        }

        self.forward(&calendar, &batch.events).await;

        info!(
            created = summary.created,
            updated = summary.updated,
            cancelled = summary.cancelled,
            full_sync = summary.full_sync,
            "calendar synced"
        );
        Ok(SyncOutcome::Synced(summary))
    }

    /// Calendars visible to an owner's credentials, for calendar selection.
    ///
    /// # Errors
    /// `NotFound` when the owner has no stored credentials.
    #[instrument(skip(self))]
    pub async fn list_available_calendars(
        &self,
        owner: &CredentialOwner,
    ) -> Result<Vec<AvailableCalendar>> {
        let mut credentials = self.token_store.get_credentials(owner).await?.ok_or_else(|| {
            CalSyncError::NotFound(format!("no credentials for {} {}", owner.kind(), owner.id()))
        })?;
        self.client.list_calendars(&mut credentials).await
    }

    pub(super) async fn load_target(&self, calendar_id: &str) -> Result<Target> {
        let Some(calendar) = self.registry.get_calendar(calendar_id).await? else {
            return Ok(Target::Skip(SkipReason::CalendarNotFound));
        };
        if !calendar.is_active {
            return Ok(Target::Skip(SkipReason::CalendarInactive));
        }
        match self.token_store.get_credentials(&calendar.credential_owner()).await? {
            Some(credentials) => Ok(Target::Ready(calendar, credentials)),
            None => {
                warn!(
                    calendar_id,
                    owner = %calendar.credential_owner().id(),
                    "no credentials stored for calendar owner"
                );
                Ok(Target::Skip(SkipReason::CredentialsNotFound))
            }
        }
    }

    async fn forward(&self, calendar: &Calendar, events: &[ProviderEvent]) {
        if events.is_empty() {
            return;
        }
        if let Err(err) = self.forwarder.forward(calendar, events).await {
            warn!(error = %err, events = events.len(), "failed to forward events downstream");
        }
    }

    pub(super) fn margin_secs(&self) -> i64 {
        i64::try_from(self.config.renewal_margin.as_secs()).unwrap_or(i64::MAX)
    }
}
