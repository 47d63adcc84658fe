//! Configuration structures
//!
//! Loaded by `calsync_infra::config`; every section except `google`
//! carries defaults so a minimal file only needs client credentials.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CalSyncError, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Build a configuration with defaults around the given client credentials.
    pub fn with_google_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            google: GoogleConfig::new(client_id, client_secret),
            sync: SyncConfig::default(),
            downstream: DownstreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Reject values that would make the service unusable.
    ///
    /// # Errors
    /// Returns `CalSyncError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.google.client_id.trim().is_empty() || self.google.client_secret.trim().is_empty() {
            return Err(CalSyncError::Config("google client id and secret are required".into()));
        }
        if self.database.pool_size == 0 {
            return Err(CalSyncError::Config("database.pool_size must be at least 1".into()));
        }
        if self.google.request_timeout_secs == 0 {
            return Err(CalSyncError::Config("google.request_timeout_secs must be positive".into()));
        }
        if self.google.max_attempts == 0 {
            return Err(CalSyncError::Config("google.max_attempts must be at least 1".into()));
        }
        if self.sync.renewal_margin_secs == 0 {
            return Err(CalSyncError::Config("sync.renewal_margin_secs must be positive".into()));
        }
        Ok(())
    }

    /// Address the provider should deliver push notifications to.
    pub fn webhook_callback_url(&self) -> Option<String> {
        self.server
            .public_base_url
            .as_deref()
            .map(|base| format!("{}/webhooks/google", base.trim_end_matches('/')))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Externally reachable base URL used to build the webhook callback.
    pub public_base_url: Option<String>,
    /// Bearer token guarding the `/api` routes. Unset leaves them open.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1:3030".into(), public_base_url: None, admin_token: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "calsync.db".into(), pool_size: 4 }
    }
}

/// Google Calendar API client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl GoogleConfig {
    /// Create a new Google config pointing at the public endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    2
}

/// Sync engine and channel renewal tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long before expiry a webhook channel becomes eligible for renewal.
    pub renewal_margin_secs: u64,
    /// Six-field cron expression (with seconds) driving the renewal pass.
    pub renewal_cron: String,
    /// Upper bound for a single renewal pass.
    pub renewal_timeout_secs: u64,
    /// Requested channel lifetime. `None` accepts the provider default.
    pub channel_ttl_secs: Option<u64>,
    /// Access tokens this close to their expiry are refreshed before use.
    pub refresh_skew_secs: u64,
}

impl SyncConfig {
    pub fn renewal_margin(&self) -> Duration {
        Duration::from_secs(self.renewal_margin_secs)
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs)
    }

    pub fn channel_ttl(&self) -> Option<Duration> {
        self.channel_ttl_secs.map(Duration::from_secs)
    }

    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            renewal_margin_secs: 15 * 60,
            renewal_cron: "0 */10 * * * *".into(),
            renewal_timeout_secs: 120,
            channel_ttl_secs: None,
            refresh_skew_secs: 60,
        }
    }
}

/// Where changed events are forwarded after a sync pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".into(), json: false }
    }
}
