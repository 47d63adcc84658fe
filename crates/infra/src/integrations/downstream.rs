//! HTTP forwarder that notifies a downstream service of changed events.

use async_trait::async_trait;
use calsync_core::EventForwarder;
use calsync_domain::{CalSyncError, Calendar, ProviderEvent, Result};
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::errors::status_error;
use crate::http::HttpClient;

/// Posts each changed event to `{base_url}/event/{provider_event_id}`.
pub struct HttpEventForwarder {
    http: HttpClient,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ForwardedEvent<'a> {
    calendar_id: &'a str,
    provider_calendar_id: &'a str,
    provider_event_id: &'a str,
    status: &'static str,
    title: Option<&'a str>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    is_all_day: bool,
}

impl HttpEventForwarder {
    /// # Errors
    /// Returns `CalSyncError::Config` when `base_url` is not an absolute
    /// http(s) URL.
    pub fn new(http: HttpClient, base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| CalSyncError::Config(format!("invalid downstream url {base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CalSyncError::Config(format!(
                "downstream url must be http(s): {base_url}"
            )));
        }
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn post(&self, calendar: &Calendar, event: &ProviderEvent) -> Result<()> {
        let url = format!(
            "{}/event/{}",
            self.base_url,
            urlencoding::encode(&event.provider_event_id)
        );
        let body = ForwardedEvent {
            calendar_id: &calendar.id,
            provider_calendar_id: &calendar.provider_calendar_id,
            provider_event_id: &event.provider_event_id,
            status: event.status.as_str(),
            title: event.title.as_deref(),
            start_time: event.start_time,
            end_time: event.end_time,
            is_all_day: event.is_all_day,
        };

        let response = self.http.send(self.http.request(Method::POST, url).json(&body)).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail));
        }
        Ok(())
    }
}

#[async_trait]
impl EventForwarder for HttpEventForwarder {
    /// Every event is attempted; the call fails if any of them failed.
    #[instrument(skip_all, fields(calendar_id = %calendar.id, count = events.len()))]
    async fn forward(&self, calendar: &Calendar, events: &[ProviderEvent]) -> Result<()> {
        let mut failed = 0usize;
        for event in events {
            if let Err(err) = self.post(calendar, event).await {
                warn!(provider_event_id = %event.provider_event_id, error = %err, "downstream rejected event");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(CalSyncError::ProviderUnavailable(format!(
                "downstream accepted {} of {} events",
                events.len() - failed,
                events.len()
            )));
        }
        debug!("events forwarded downstream");
        Ok(())
    }
}
