//! Credential refresh decorator around a [`CalendarProvider`]
//!
//! Every provider call runs through [`RefreshingClient::call`]: an
//! authorization failure triggers at most one refresh and one retry. The
//! refreshed token is persisted before the retry is attempted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use calsync_domain::{
    AvailableCalendar, CalSyncError, Credentials, EventBatch, Result, WatchRegistration,
};
use tracing::{debug, info, instrument, warn};

use crate::calendar_ports::{CalendarProvider, TokenStore};
use crate::clock::{Clock, SystemClock};

/// Refresh slightly before the recorded expiry.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Provider decorator that keeps the owner's access token usable.
pub struct RefreshingClient {
    provider: Arc<dyn CalendarProvider>,
    token_store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    refresh_skew_secs: i64,
}

impl RefreshingClient {
    /// Create a new client with the system clock and the default skew.
    pub fn new(provider: Arc<dyn CalendarProvider>, token_store: Arc<dyn TokenStore>) -> Self {
        Self {
            provider,
            token_store,
            clock: Arc::new(SystemClock),
            refresh_skew_secs: skew_secs(DEFAULT_REFRESH_SKEW),
        }
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Treat credentials as expired this long before their recorded expiry.
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew_secs = skew_secs(skew);
        self
    }

    /// Run `op` with a valid access token.
    ///
    /// Credentials already past their expiry are refreshed up front, which
    /// uses up the single refresh. Otherwise an `Unauthorized` result
    /// refreshes once and retries once. A second authorization failure
    /// becomes `CredentialsExpired`.
    pub async fn call<T, F, Fut>(&self, credentials: &mut Credentials, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut refreshed = false;
        if credentials.refresh_token.is_some()
            && credentials.is_expired(self.clock.now(), self.refresh_skew_secs)
        {
            debug!(owner = credentials.owner.id(), "access token expired, refreshing before call");
            self.refresh(credentials).await?;
            refreshed = true;
        }

        match op(credentials.access_token.clone()).await {
            Err(CalSyncError::Unauthorized(reason)) if refreshed => {
                Err(CalSyncError::CredentialsExpired(format!(
                    "provider rejected refreshed token: {reason}"
                )))
            }
            Err(CalSyncError::Unauthorized(reason)) => {
                debug!(owner = credentials.owner.id(), %reason, "provider rejected access token");
                self.refresh(credentials).await?;
                match op(credentials.access_token.clone()).await {
                    Err(CalSyncError::Unauthorized(reason)) => {
                        warn!(
                            owner = credentials.owner.id(),
                            "authorization failed again after refresh"
                        );
                        Err(CalSyncError::CredentialsExpired(format!(
                            "provider rejected refreshed token: {reason}"
                        )))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    #[instrument(skip_all, fields(owner = %credentials.owner.id(), kind = credentials.owner.kind()))]
    async fn refresh(&self, credentials: &mut Credentials) -> Result<()> {
        let Some(refresh_token) = credentials.refresh_token.clone() else {
            return Err(CalSyncError::CredentialsExpired(format!(
                "no refresh token stored for {} {}",
                credentials.owner.kind(),
                credentials.owner.id()
            )));
        };

        let refreshed = match self.provider.refresh_access_token(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(err @ CalSyncError::ProviderUnavailable(_)) => return Err(err),
            Err(err @ CalSyncError::CredentialsExpired(_)) => return Err(err),
            Err(other) => {
                return Err(CalSyncError::CredentialsExpired(format!(
                    "token refresh failed: {other}"
                )))
            }
        };

        credentials.apply_refresh(&refreshed, self.clock.now());
        self.token_store
            .update_credentials(
                &credentials.owner,
                &credentials.access_token,
                refreshed.refresh_token.as_deref(),
                credentials.expires_at,
            )
            .await?;

        info!(rotated = refreshed.refresh_token.is_some(), "access token refreshed");
        Ok(())
    }

    pub async fn list_calendars(
        &self,
        credentials: &mut Credentials,
    ) -> Result<Vec<AvailableCalendar>> {
        self.call(credentials, |token| async move { self.provider.list_calendars(&token).await })
            .await
    }

    /// Fetch every page of a listing and flatten it into one batch.
    ///
    /// Each page gets its own refresh budget.
    pub async fn fetch_events(
        &self,
        credentials: &mut Credentials,
        calendar_id: &str,
        sync_token: Option<&str>,
    ) -> Result<EventBatch> {
        let mut batch = EventBatch::default();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = {
                let page_ref = page_token.as_deref();
                self.call(credentials, |token| async move {
                    self.provider.fetch_events_page(&token, calendar_id, sync_token, page_ref).await
                })
                .await?
            };
            pages += 1;

            batch.events.extend(page.events);
            if page.next_sync_token.is_some() {
                batch.next_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(next) if Some(next.as_str()) != page_token.as_deref() => {
                    page_token = Some(next);
                }
                Some(_) => {
                    return Err(CalSyncError::Internal(
                        "provider returned the same page token twice".into(),
                    ))
                }
                None => break,
            }
        }

        debug!(calendar_id, pages, events = batch.events.len(), "fetched event batch");
        Ok(batch)
    }

    pub async fn register_watch(
        &self,
        credentials: &mut Credentials,
        calendar_id: &str,
        channel_id: &str,
        callback_address: &str,
        ttl: Option<Duration>,
    ) -> Result<WatchRegistration> {
        self.call(credentials, |token| async move {
            self.provider
                .register_watch(&token, calendar_id, channel_id, callback_address, ttl)
                .await
        })
        .await
    }

    pub async fn stop_watch(
        &self,
        credentials: &mut Credentials,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<()> {
        self.call(credentials, |token| async move {
            self.provider.stop_watch(&token, channel_id, resource_id).await
        })
        .await
    }
}

fn skew_secs(skew: Duration) -> i64 {
    i64::try_from(skew.as_secs()).unwrap_or(i64::MAX)
}
