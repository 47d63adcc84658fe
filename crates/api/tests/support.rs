//! Shared fixtures for route tests
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use calsync_api::{router, AppContext};
use calsync_domain::{Account, Calendar, Config, NewAccount, NewCalendar};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::MockServer;

pub const ADMIN_TOKEN: &str = "admin-secret";

pub struct TestApp {
    _dir: TempDir,
    pub server: MockServer,
    pub ctx: Arc<AppContext>,
}

impl TestApp {
    /// App backed by a temp database and a mock Google API, with a public
    /// base URL so channels can be registered.
    pub async fn new(admin_token: Option<&str>) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let server = MockServer::start().await;

        let mut config = Config::with_google_credentials("client-id", "client-secret");
        config.database.path = dir.path().join("api.db").to_string_lossy().into_owned();
        config.database.pool_size = 2;
        config.google.api_base_url = server.uri();
        config.google.token_url = format!("{}/token", server.uri());
        config.google.max_attempts = 1;
        config.server.public_base_url = Some("https://hooks.example.com".into());
        config.server.admin_token = admin_token.map(str::to_string);

        let ctx = Arc::new(AppContext::new(config).expect("context"));
        Self { _dir: dir, server, ctx }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.ctx))
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.expect("request handled")
    }

    pub async fn seed_account(&self) -> Account {
        self.ctx
            .accounts
            .create_account(NewAccount {
                email: "me@example.com".into(),
                access_token: "access-1".into(),
                refresh_token: Some("refresh-1".into()),
                token_expiry: None,
            })
            .await
            .expect("account")
    }

    pub async fn seed_calendar(&self, account_id: &str) -> Calendar {
        self.ctx
            .calendars
            .create_calendar(NewCalendar {
                account_id: account_id.to_string(),
                connected_account_id: None,
                provider: "google".into(),
                provider_calendar_id: "primary".into(),
                name: "Me".into(),
                color: None,
                is_primary: true,
            })
            .await
            .expect("calendar")
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
