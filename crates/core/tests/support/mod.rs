//! Shared test helpers for `calsync-core` integration tests.
//!
//! In-memory ports plus fixtures so engine tests can focus on behaviour.

#![allow(dead_code)]

pub mod provider;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use calsync_core::{FixedClock, SyncEngine, SyncEngineConfig};
use calsync_domain::{
    Calendar, CredentialOwner, Credentials, EventPage, EventStatus, ProviderEvent,
    PROVIDER_GOOGLE,
};

pub use provider::ScriptedProvider;
pub use registry::{MockCalendarRegistry, MockTokenStore};

pub const NOW: i64 = 1_700_000_000;
pub const MARGIN_SECS: i64 = 900;
pub const CALLBACK: &str = "https://sync.example.com/webhooks/google";

pub fn calendar(id: &str) -> Calendar {
    Calendar {
        id: id.to_string(),
        account_id: "acc-1".to_string(),
        connected_account_id: None,
        provider: PROVIDER_GOOGLE.to_string(),
        provider_calendar_id: format!("{id}@group.calendar.google.com"),
        name: format!("Calendar {id}"),
        color: None,
        is_primary: false,
        is_active: true,
        sync_token: None,
        webhook: None,
        created_at: NOW - 86_400,
        updated_at: NOW - 86_400,
    }
}

pub fn credentials(owner: CredentialOwner, access_token: &str) -> Credentials {
    Credentials {
        owner,
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expires_at: None,
    }
}

pub fn event(id: &str, status: EventStatus) -> ProviderEvent {
    let mut event = ProviderEvent::new(id, status);
    if !status.is_cancelled() {
        event.title = Some(format!("Event {id}"));
        event.start_time = Some(NOW + 3_600);
        event.end_time = Some(NOW + 7_200);
    }
    event.etag = Some(format!("\"etag-{id}\""));
    event
}

pub fn page(
    events: Vec<ProviderEvent>,
    next_page_token: Option<&str>,
    next_sync_token: Option<&str>,
) -> EventPage {
    EventPage {
        events,
        next_page_token: next_page_token.map(str::to_string),
        next_sync_token: next_sync_token.map(str::to_string),
    }
}

/// Engine wired to in-memory ports with a fixed clock.
pub struct Harness {
    pub registry: MockCalendarRegistry,
    pub tokens: MockTokenStore,
    pub provider: ScriptedProvider,
    pub clock: Arc<FixedClock>,
    pub engine: SyncEngine,
}

impl Harness {
    pub fn new() -> Self {
        let registry = MockCalendarRegistry::default();
        let tokens = MockTokenStore::default();
        tokens.insert(credentials(CredentialOwner::Account("acc-1".into()), "access-1"));
        let provider = ScriptedProvider::default();
        let clock = Arc::new(FixedClock::new(NOW));

        let config = SyncEngineConfig {
            renewal_margin: Duration::from_secs(MARGIN_SECS as u64),
            callback_address: Some(CALLBACK.to_string()),
            channel_ttl: None,
            ..Default::default()
        };
        let engine = SyncEngine::new(
            Arc::new(registry.clone()),
            Arc::new(tokens.clone()),
            Arc::new(provider.clone()),
            config,
        )
        .with_clock(clock.clone());

        Self { registry, tokens, provider, clock, engine }
    }

    pub fn with_calendar(self, calendar: Calendar) -> Self {
        self.registry.insert_calendar(calendar);
        self
    }
}
