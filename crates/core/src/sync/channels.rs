//! Webhook channel lifecycle and inbound notification handling
//!
//! A calendar has no channel, an active one, or one inside the renewal
//! margin. Renewal always registers a fresh channel id and swaps the stored
//! channel in a single registry update.

use calsync_domain::{
    CalSyncError, Calendar, ChannelState, Credentials, IgnoreReason, NotificationOutcome,
    RenewalFailure, RenewalOutcome, RenewalReport, Result, WebhookChannel, WebhookNotification,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::engine::{SyncEngine, Target};

impl SyncEngine {
    /// Register a new channel if the calendar has none or its channel is
    /// inside the renewal margin.
    ///
    /// # Errors
    /// `Config` without a callback address; `WatchRegistrationFailed` when
    /// the provider refuses. Failures are not retried here; the next
    /// renewal pass picks the calendar up again.
    #[instrument(skip(self))]
    pub async fn renew_channel(&self, calendar_id: &str) -> Result<RenewalOutcome> {
        self.renew(calendar_id, false).await
    }

    /// Replace the channel regardless of its expiry.
    #[instrument(skip(self))]
    pub async fn rotate_channel(&self, calendar_id: &str) -> Result<RenewalOutcome> {
        self.renew(calendar_id, true).await
    }

    async fn renew(&self, calendar_id: &str, force: bool) -> Result<RenewalOutcome> {
        let callback = self.callback_address()?;
        let (calendar, mut credentials) = match self.load_target(calendar_id).await? {
            Target::Ready(calendar, credentials) => (calendar, credentials),
            Target::Skip(reason) => return Ok(RenewalOutcome::Skipped { reason }),
        };

        let now = self.clock.now();
        if !force {
            if let (ChannelState::Active, Some(current)) =
                (calendar.channel_state(now, self.margin_secs()), &calendar.webhook)
            {
                debug!(expires_at = current.expires_at, "channel not due for renewal");
                return Ok(RenewalOutcome::NotDue { expires_at: current.expires_at });
            }
        }

        let channel_id = Uuid::new_v4().to_string();
        let registered = self
            .client
            .register_watch(
                &mut credentials,
                &calendar.provider_calendar_id,
                &channel_id,
                callback,
                self.config.channel_ttl,
            )
            .await;

        let registration = match registered {
            Ok(registration) => registration,
            Err(err) => {
                warn!(error = %err, "channel registration failed");
                if matches!(err, CalSyncError::WatchRegistrationFailed(_)) {
                    self.drop_lapsed_channel(&calendar, now).await?;
                }
                return Err(err);
            }
        };

        let channel = WebhookChannel {
            channel_id,
            resource_id: registration.resource_id,
            expires_at: registration.expires_at,
        };
        if let Err(err) = self.registry.update_webhook_channel(&calendar.id, &channel).await {
            warn!(error = %err, channel_id = %channel.channel_id, "could not store new channel");
            self.retire_channel(&mut credentials, &channel).await;
            return Err(err);
        }
        info!(
            channel_id = %channel.channel_id,
            resource_id = %channel.resource_id,
            expires_at = channel.expires_at,
            "webhook channel registered"
        );

        if let Some(previous) = &calendar.webhook {
            self.retire_channel(&mut credentials, previous).await;
        }

        Ok(RenewalOutcome::Renewed(channel))
    }

    /// One renewal pass over every active calendar that needs a channel.
    ///
    /// Calendars are renewed independently; a failure is recorded in the
    /// report and does not stop the pass.
    ///
    /// # Errors
    /// Only configuration and registry listing failures abort the pass.
    #[instrument(skip(self))]
    pub async fn renew_due_channels(&self) -> Result<RenewalReport> {
        self.callback_address()?;
        let deadline = self.clock.now().saturating_add(self.margin_secs());
        let due = self.registry.list_calendars_due_for_renewal(deadline).await?;

        let mut report = RenewalReport::default();
        for calendar in due {
            report.examined += 1;
            match self.renew_channel(&calendar.id).await {
                Ok(RenewalOutcome::Renewed(_)) => report.renewed += 1,
                Ok(RenewalOutcome::NotDue { .. } | RenewalOutcome::Skipped { .. }) => {
                    report.skipped += 1;
                }
                Err(error) => {
                    report.failures.push(RenewalFailure { calendar_id: calendar.id, error });
                }
            }
        }

        info!(
            examined = report.examined,
            renewed = report.renewed,
            failed = report.failures.len(),
            "renewal pass finished"
        );
        Ok(report)
    }

    /// Resolve a push notification to a calendar and sync it once.
    ///
    /// Unknown resources and notifications from a replaced channel are
    /// acknowledged without touching the registry.
    #[instrument(skip_all, fields(resource_id = %notification.resource_id))]
    pub async fn handle_notification(
        &self,
        notification: &WebhookNotification,
    ) -> Result<NotificationOutcome> {
        let Some(calendar) =
            self.registry.get_calendar_by_webhook_resource_id(&notification.resource_id).await?
        else {
            debug!("notification for unknown resource ignored");
            return Ok(NotificationOutcome::Ignored { reason: IgnoreReason::UnknownResource });
        };

        if let (Some(received), Some(current)) =
            (notification.channel_id.as_deref(), calendar.webhook.as_ref())
        {
            if received != current.channel_id {
                debug!(received, current = %current.channel_id, "notification from stale channel");
                return Ok(NotificationOutcome::Ignored { reason: IgnoreReason::StaleChannel });
            }
        }

        let sync = self.sync_calendar(&calendar.id).await?;
        Ok(NotificationOutcome::Synced { calendar_id: calendar.id, sync })
    }

    fn callback_address(&self) -> Result<&str> {
        self.config.callback_address.as_deref().ok_or_else(|| {
            CalSyncError::Config("webhook callback address is not configured".into())
        })
    }

    /// Clear a channel that has already expired so the calendar reads as
    /// having none. A still-valid channel is kept.
    async fn drop_lapsed_channel(&self, calendar: &Calendar, now: i64) -> Result<()> {
        if calendar.webhook.as_ref().is_some_and(|channel| channel.is_expired(now)) {
            self.registry.clear_webhook_channel(&calendar.id).await?;
            info!(calendar_id = %calendar.id, "expired channel cleared after failed renewal");
        }
        Ok(())
    }

    /// Stop a channel nothing will track any more. Best effort; the
    /// channel expires on its own if this fails.
    async fn retire_channel(&self, credentials: &mut Credentials, channel: &WebhookChannel) {
        if let Err(err) =
            self.client.stop_watch(credentials, &channel.channel_id, &channel.resource_id).await
        {
            warn!(error = %err, channel_id = %channel.channel_id, "failed to stop channel");
        }
    }
}
