use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync_core::{CalendarRegistry, TokenStore};
use calsync_domain::{
    CalSyncError, Calendar, CredentialOwner, Credentials, ProviderEvent, Result as DomainResult,
    StoredEvent, UpsertOutcome, WebhookChannel,
};

use super::NOW;

#[derive(Default)]
struct RegistryState {
    calendars: HashMap<String, Calendar>,
    events: HashMap<(String, String), StoredEvent>,
    mutations: usize,
    upserts: usize,
    fail_upserts_after: Option<usize>,
    fail_channel_updates: bool,
}

/// In-memory `CalendarRegistry`.
///
/// Counts every mutating call so tests can assert that a code path left
/// the registry untouched, and can inject an upsert failure to simulate a
/// crash half-way through a batch.
#[derive(Default, Clone)]
pub struct MockCalendarRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl MockCalendarRegistry {
    pub fn insert_calendar(&self, calendar: Calendar) {
        self.state.lock().unwrap().calendars.insert(calendar.id.clone(), calendar);
    }

    pub fn calendar(&self, id: &str) -> Option<Calendar> {
        self.state.lock().unwrap().calendars.get(id).cloned()
    }

    /// Events of a calendar ordered by provider event id.
    pub fn events(&self, calendar_id: &str) -> Vec<StoredEvent> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<_> =
            state.events.values().filter(|e| e.calendar_id == calendar_id).cloned().collect();
        events.sort_by(|a, b| a.provider_event_id.cmp(&b.provider_event_id));
        events
    }

    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    /// Fail every upsert after the first `n` succeed.
    pub fn fail_upserts_after(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.upserts = 0;
        state.fail_upserts_after = Some(n);
    }

    /// Make every `update_webhook_channel` call fail with a database error.
    pub fn fail_channel_updates(&self) {
        self.state.lock().unwrap().fail_channel_updates = true;
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_upserts_after = None;
        state.fail_channel_updates = false;
    }

    fn mutate_calendar(&self, id: &str, apply: impl FnOnce(&mut Calendar)) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let calendar = state
            .calendars
            .get_mut(id)
            .ok_or_else(|| CalSyncError::NotFound(format!("calendar {id}")))?;
        apply(calendar);
        Ok(())
    }
}

#[async_trait]
impl CalendarRegistry for MockCalendarRegistry {
    async fn get_calendar(&self, id: &str) -> DomainResult<Option<Calendar>> {
        Ok(self.calendar(id))
    }

    async fn get_calendar_by_webhook_resource_id(
        &self,
        resource_id: &str,
    ) -> DomainResult<Option<Calendar>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .calendars
            .values()
            .find(|c| {
                c.is_active && c.webhook.as_ref().is_some_and(|w| w.resource_id == resource_id)
            })
            .cloned())
    }

    async fn list_calendars_due_for_renewal(&self, deadline: i64) -> DomainResult<Vec<Calendar>> {
        let state = self.state.lock().unwrap();
        let mut due: Vec<_> = state
            .calendars
            .values()
            .filter(|c| c.is_active)
            .filter(|c| c.webhook.as_ref().map_or(true, |w| w.expires_at < deadline))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(due)
    }

    async fn update_sync_token(&self, id: &str, sync_token: &str) -> DomainResult<()> {
        self.mutate_calendar(id, |c| c.sync_token = Some(sync_token.to_string()))
    }

    async fn clear_sync_token(&self, id: &str) -> DomainResult<()> {
        self.mutate_calendar(id, |c| c.sync_token = None)
    }

    async fn update_webhook_channel(
        &self,
        id: &str,
        channel: &WebhookChannel,
    ) -> DomainResult<()> {
        if self.state.lock().unwrap().fail_channel_updates {
            return Err(CalSyncError::Database("disk I/O error".into()));
        }
        self.mutate_calendar(id, |c| c.webhook = Some(channel.clone()))
    }

    async fn clear_webhook_channel(&self, id: &str) -> DomainResult<()> {
        self.mutate_calendar(id, |c| c.webhook = None)
    }

    async fn upsert_event(
        &self,
        calendar_id: &str,
        event: &ProviderEvent,
    ) -> DomainResult<UpsertOutcome> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.fail_upserts_after {
            if state.upserts >= limit {
                return Err(CalSyncError::Database("injected upsert failure".into()));
            }
        }
        state.upserts += 1;
        state.mutations += 1;

        let key = (calendar_id.to_string(), event.provider_event_id.clone());
        let deleted_at = event.status.is_cancelled().then_some(NOW);
        match state.events.get_mut(&key) {
            Some(existing) => {
                existing.status = event.status;
                existing.etag = event.etag.clone();
                existing.raw_data = event.raw_data.clone();
                if !event.status.is_cancelled() {
                    existing.title = event.title.clone();
                    existing.start_time = event.start_time;
                    existing.end_time = event.end_time;
                }
                existing.deleted_at =
                    if event.status.is_cancelled() { existing.deleted_at.or(Some(NOW)) } else { None };
                existing.updated_at = NOW;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let stored = StoredEvent {
                    id: format!("evt-{}", state.events.len() + 1),
                    calendar_id: calendar_id.to_string(),
                    provider_event_id: event.provider_event_id.clone(),
                    title: event.title.clone(),
                    description: event.description.clone(),
                    location: event.location.clone(),
                    start_time: event.start_time,
                    end_time: event.end_time,
                    is_all_day: event.is_all_day,
                    status: event.status,
                    recurrence: event.recurrence.clone(),
                    attendees: event.attendees.clone(),
                    etag: event.etag.clone(),
                    raw_data: event.raw_data.clone(),
                    deleted_at,
                    created_at: NOW,
                    updated_at: NOW,
                };
                state.events.insert(key, stored);
                Ok(UpsertOutcome::Created)
            }
        }
    }
}

#[derive(Default)]
struct TokenState {
    credentials: HashMap<CredentialOwner, Credentials>,
    updates: Vec<(CredentialOwner, String, Option<String>)>,
}

/// In-memory `TokenStore` recording every credential update.
#[derive(Default, Clone)]
pub struct MockTokenStore {
    state: Arc<Mutex<TokenState>>,
}

impl MockTokenStore {
    pub fn insert(&self, credentials: Credentials) {
        self.state.lock().unwrap().credentials.insert(credentials.owner.clone(), credentials);
    }

    pub fn remove(&self, owner: &CredentialOwner) {
        self.state.lock().unwrap().credentials.remove(owner);
    }

    pub fn get(&self, owner: &CredentialOwner) -> Option<Credentials> {
        self.state.lock().unwrap().credentials.get(owner).cloned()
    }

    /// (owner, access token, rotated refresh token) per update, in order.
    pub fn updates(&self) -> Vec<(CredentialOwner, String, Option<String>)> {
        self.state.lock().unwrap().updates.clone()
    }
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn get_credentials(&self, owner: &CredentialOwner) -> DomainResult<Option<Credentials>> {
        Ok(self.get(owner))
    }

    async fn update_credentials(
        &self,
        owner: &CredentialOwner,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.updates.push((
            owner.clone(),
            access_token.to_string(),
            refresh_token.map(str::to_string),
        ));
        let stored = state
            .credentials
            .get_mut(owner)
            .ok_or_else(|| CalSyncError::NotFound(format!("credentials for {}", owner.id())))?;
        stored.access_token = access_token.to_string();
        if let Some(rotated) = refresh_token {
            stored.refresh_token = Some(rotated.to_string());
        }
        stored.expires_at = expires_at;
        Ok(())
    }
}
