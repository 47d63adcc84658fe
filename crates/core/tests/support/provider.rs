use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use calsync_core::CalendarProvider;
use calsync_domain::{
    AvailableCalendar, CalSyncError, EventPage, RefreshedToken, Result as DomainResult,
    WatchRegistration,
};

/// Arguments of one `fetch_events_page` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub access_token: String,
    pub calendar_id: String,
    pub sync_token: Option<String>,
    pub page_token: Option<String>,
}

/// Arguments of one `register_watch` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchCall {
    pub access_token: String,
    pub calendar_id: String,
    pub channel_id: String,
    pub callback_address: String,
}

#[derive(Default)]
struct ProviderState {
    accepted_token: Option<String>,
    pages: VecDeque<DomainResult<EventPage>>,
    watches: VecDeque<DomainResult<WatchRegistration>>,
    refreshes: VecDeque<DomainResult<RefreshedToken>>,
    calendars: Vec<AvailableCalendar>,
    fetch_calls: Vec<FetchCall>,
    watch_calls: Vec<WatchCall>,
    stop_calls: Vec<(String, String)>,
    refresh_calls: usize,
    list_calls: usize,
}

/// `CalendarProvider` that replays queued responses and records calls.
///
/// When an accepted token is set, any call made with a different access
/// token fails with `Unauthorized` before consuming a queued response.
#[derive(Default, Clone)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl ScriptedProvider {
    pub fn accept_only(&self, token: &str) {
        self.state.lock().unwrap().accepted_token = Some(token.to_string());
    }

    pub fn push_page(&self, page: DomainResult<EventPage>) {
        self.state.lock().unwrap().pages.push_back(page);
    }

    pub fn push_watch(&self, registration: DomainResult<WatchRegistration>) {
        self.state.lock().unwrap().watches.push_back(registration);
    }

    pub fn push_refresh(&self, refreshed: DomainResult<RefreshedToken>) {
        self.state.lock().unwrap().refreshes.push_back(refreshed);
    }

    pub fn set_calendars(&self, calendars: Vec<AvailableCalendar>) {
        self.state.lock().unwrap().calendars = calendars;
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.state.lock().unwrap().fetch_calls.clone()
    }

    pub fn watch_calls(&self) -> Vec<WatchCall> {
        self.state.lock().unwrap().watch_calls.clone()
    }

    pub fn stop_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().stop_calls.clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    fn authorize(state: &ProviderState, access_token: &str) -> DomainResult<()> {
        match &state.accepted_token {
            Some(accepted) if accepted != access_token => {
                Err(CalSyncError::Unauthorized("invalid credentials".into()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CalendarProvider for ScriptedProvider {
    async fn list_calendars(&self, access_token: &str) -> DomainResult<Vec<AvailableCalendar>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Self::authorize(&state, access_token)?;
        Ok(state.calendars.clone())
    }

    async fn fetch_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        sync_token: Option<&str>,
        page_token: Option<&str>,
    ) -> DomainResult<EventPage> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls.push(FetchCall {
            access_token: access_token.to_string(),
            calendar_id: calendar_id.to_string(),
            sync_token: sync_token.map(str::to_string),
            page_token: page_token.map(str::to_string),
        });
        Self::authorize(&state, access_token)?;
        state.pages.pop_front().unwrap_or_else(|| Ok(EventPage::default()))
    }

    async fn register_watch(
        &self,
        access_token: &str,
        calendar_id: &str,
        channel_id: &str,
        callback_address: &str,
        _ttl: Option<Duration>,
    ) -> DomainResult<WatchRegistration> {
        let mut state = self.state.lock().unwrap();
        state.watch_calls.push(WatchCall {
            access_token: access_token.to_string(),
            calendar_id: calendar_id.to_string(),
            channel_id: channel_id.to_string(),
            callback_address: callback_address.to_string(),
        });
        Self::authorize(&state, access_token)?;
        state.watches.pop_front().unwrap_or_else(|| {
            Err(CalSyncError::WatchRegistrationFailed("no scripted response".into()))
        })
    }

    async fn stop_watch(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: &str,
    ) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::authorize(&state, access_token)?;
        state.stop_calls.push((channel_id.to_string(), resource_id.to_string()));
        Ok(())
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> DomainResult<RefreshedToken> {
        let mut state = self.state.lock().unwrap();
        state.refresh_calls += 1;
        state
            .refreshes
            .pop_front()
            .unwrap_or_else(|| Err(CalSyncError::CredentialsExpired("invalid_grant".into())))
    }
}
