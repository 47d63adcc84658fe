//! Google Calendar implementation of the CalendarProvider port

use std::time::Duration;

use async_trait::async_trait;
use calsync_core::CalendarProvider;
use calsync_domain::{
    AvailableCalendar, CalSyncError, EventPage, GoogleConfig, RefreshedToken, Result,
    WatchRegistration,
};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use super::types::{
    convert_event, CalendarListResponse, EventsResponse, StopRequest, TokenErrorResponse,
    WatchParams, WatchRequest, WatchResponse,
};
use crate::errors::{status_error, InfraError};
use crate::http::HttpClient;

const EVENTS_PAGE_SIZE: &str = "250";

/// Google Calendar v3 client.
///
/// Base and token URLs come from config so tests can point them at a mock
/// server.
pub struct GoogleCalendarProvider {
    http: HttpClient,
    api_base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleCalendarProvider {
    /// Create a new provider with an HTTP client built from `config`.
    pub fn new(config: &GoogleConfig) -> Result<Self> {
        Ok(Self::with_client(config, HttpClient::from_config(config)?))
    }

    /// Create a new provider around an existing HTTP client.
    pub fn with_client(config: &GoogleConfig, http: HttpClient) -> Self {
        Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}/events", self.api_base_url, urlencoding::encode(calendar_id))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    #[instrument(skip_all)]
    async fn list_calendars(&self, access_token: &str) -> Result<Vec<AvailableCalendar>> {
        let url = format!("{}/users/me/calendarList", self.api_base_url);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.request(Method::GET, &url).bearer_auth(access_token);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = self.http.send(request).await?;
            let page: CalendarListResponse = read_json(ensure_success(response).await?).await?;
            calendars.extend(page.items.into_iter().map(AvailableCalendar::from));

            match page.next_page_token {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => page_token = Some(next),
                _ => break,
            }
        }

        debug!(count = calendars.len(), "listed provider calendars");
        Ok(calendars)
    }

    #[instrument(skip(self, access_token, sync_token, page_token), fields(incremental = sync_token.is_some(), paged = page_token.is_some()))]
    async fn fetch_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        sync_token: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<EventPage> {
        let mut query: Vec<(&str, &str)> =
            vec![("showDeleted", "true"), ("singleEvents", "true"), ("maxResults", EVENTS_PAGE_SIZE)];
        if let Some(token) = sync_token {
            query.push(("syncToken", token));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let request = self
            .http
            .request(Method::GET, self.events_url(calendar_id))
            .bearer_auth(access_token)
            .query(&query);

        let response = self.http.send(request).await?;
        let body: EventsResponse = read_json(ensure_success(response).await?).await?;

        let events = body.items.into_iter().map(convert_event).collect::<Result<Vec<_>>>()?;
        debug!(
            count = events.len(),
            has_next_page = body.next_page_token.is_some(),
            has_sync_token = body.next_sync_token.is_some(),
            "fetched events page"
        );

        Ok(EventPage {
            events,
            next_page_token: body.next_page_token,
            next_sync_token: body.next_sync_token,
        })
    }

    #[instrument(skip(self, access_token, callback_address))]
    async fn register_watch(
        &self,
        access_token: &str,
        calendar_id: &str,
        channel_id: &str,
        callback_address: &str,
        ttl: Option<Duration>,
    ) -> Result<WatchRegistration> {
        let body = WatchRequest {
            id: channel_id,
            kind: "web_hook",
            address: callback_address,
            params: ttl.map(|ttl| WatchParams { ttl: ttl.as_secs().to_string() }),
        };
        let request = self
            .http
            .request(Method::POST, format!("{}/watch", self.events_url(calendar_id)))
            .bearer_auth(access_token)
            .json(&body);

        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status_error(status, &detail) {
                err @ (CalSyncError::Unauthorized(_) | CalSyncError::ProviderUnavailable(_)) => err,
                _ => CalSyncError::WatchRegistrationFailed(format!("{status}: {detail}")),
            });
        }

        let watch: WatchResponse = read_json(response).await?;
        let expires_at = watch.expires_at_secs();
        match (watch.resource_id, expires_at) {
            (Some(resource_id), Some(expires_at)) => {
                info!(%resource_id, expires_at, "watch channel registered");
                Ok(WatchRegistration { resource_id, expires_at })
            }
            (resource_id, _) => {
                // The channel exists upstream even though we cannot track it.
                if let Some(resource_id) = resource_id {
                    if let Err(err) = self.stop_watch(access_token, channel_id, &resource_id).await {
                        warn!(error = %err, %resource_id, "failed to stop untracked watch channel");
                    }
                }
                Err(CalSyncError::WatchRegistrationFailed(
                    "watch response carried no resource id or expiration".into(),
                ))
            }
        }
    }

    #[instrument(skip(self, access_token))]
    async fn stop_watch(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<()> {
        let request = self
            .http
            .request(Method::POST, format!("{}/channels/stop", self.api_base_url))
            .bearer_auth(access_token)
            .json(&StopRequest { id: channel_id, resource_id });

        let response = self.http.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("channel already gone upstream");
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let request = self.http.request(Method::POST, &self.token_url).form(&form);

        let response = self.http.send(request).await?;
        let status = response.status();
        if status.is_success() {
            let token: RefreshedToken = read_json(response).await?;
            debug!(rotated = token.refresh_token.is_some(), "access token refreshed");
            return Ok(token);
        }

        let body = response.text().await.unwrap_or_default();
        let detail: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
        warn!(%status, error = %detail.error, "token refresh rejected");

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CalSyncError::ProviderUnavailable(format!("token endpoint returned {status}")));
        }
        let reason = detail.error_description.unwrap_or(detail.error);
        Err(CalSyncError::CredentialsExpired(format!("refresh rejected ({status}): {reason}")))
    }
}

/// Map a non-2xx response to a domain error, keeping the body as detail.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(status_error(status, &detail))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(response.json::<T>().await.map_err(InfraError::from)?)
}
