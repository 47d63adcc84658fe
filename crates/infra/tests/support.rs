#![allow(dead_code)]

use std::sync::Arc;

use calsync_core::{SyncEngine, SyncEngineConfig};
use calsync_domain::{Account, Calendar, GoogleConfig, NewAccount, NewCalendar};
use calsync_infra::database::{DbManager, SqliteAccountRepository, SqliteCalendarRepository};
use calsync_infra::http::HttpClient;
use calsync_infra::integrations::GoogleCalendarProvider;
use tempfile::TempDir;
use wiremock::MockServer;

pub const CALLBACK: &str = "https://hooks.example.com/webhooks/google";

/// Temporary database that lives as long as the test.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager =
            DbManager::new(temp_dir.path().join("test.db"), 4).expect("db manager should be created");
        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Google config pointing both API and token endpoint at the mock server.
pub fn google_config(server: &MockServer) -> GoogleConfig {
    let mut config = GoogleConfig::new("client-id", "client-secret");
    config.api_base_url = server.uri();
    config.token_url = format!("{}/token", server.uri());
    config
}

/// Provider without backoff so retry tests stay fast.
pub fn google_provider(server: &MockServer, max_attempts: usize) -> GoogleCalendarProvider {
    let http = HttpClient::builder()
        .max_attempts(max_attempts)
        .base_backoff(std::time::Duration::ZERO)
        .build()
        .expect("http client");
    GoogleCalendarProvider::with_client(&google_config(server), http)
}

/// Real repositories and engine wired to a mock Google.
pub struct Stack {
    pub db: TestDatabase,
    pub server: MockServer,
    pub accounts: Arc<SqliteAccountRepository>,
    pub calendars: Arc<SqliteCalendarRepository>,
    pub engine: SyncEngine,
}

impl Stack {
    pub async fn new() -> Self {
        let db = TestDatabase::new();
        let server = MockServer::start().await;
        let accounts = Arc::new(SqliteAccountRepository::new(db.manager.pool()));
        let calendars = Arc::new(SqliteCalendarRepository::new(db.manager.pool()));
        let provider = Arc::new(google_provider(&server, 1));

        let engine = SyncEngine::new(
            calendars.clone(),
            accounts.clone(),
            provider,
            SyncEngineConfig { callback_address: Some(CALLBACK.into()), ..Default::default() },
        );

        Self { db, server, accounts, calendars, engine }
    }

    pub async fn seed_account(&self, access_token: &str) -> Account {
        self.accounts
            .create_account(NewAccount {
                email: "me@example.com".into(),
                access_token: access_token.into(),
                refresh_token: Some("refresh-1".into()),
                token_expiry: None,
            })
            .await
            .expect("account seeded")
    }

    pub async fn seed_calendar(&self, account_id: &str, provider_calendar_id: &str) -> Calendar {
        self.calendars
            .create_calendar(NewCalendar {
                account_id: account_id.into(),
                connected_account_id: None,
                provider: "google".into(),
                provider_calendar_id: provider_calendar_id.into(),
                name: "Me".into(),
                color: None,
                is_primary: true,
            })
            .await
            .expect("calendar seeded")
    }
}
