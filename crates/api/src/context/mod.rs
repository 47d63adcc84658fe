//! Application context - dependency injection container

use std::sync::Arc;

use calsync_core::{CalendarProvider, EventForwarder, SyncEngine, SyncEngineConfig};
use calsync_domain::{Config, Result};
use calsync_infra::{
    ChannelRenewalScheduler, DbManager, GoogleCalendarProvider, HttpClient, HttpEventForwarder,
    RenewalSchedulerConfig, SqliteAccountRepository, SqliteCalendarRepository,
};
use tracing::info;

/// Everything a request handler or background job needs
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub accounts: Arc<SqliteAccountRepository>,
    pub calendars: Arc<SqliteCalendarRepository>,
    pub engine: Arc<SyncEngine>,
}

impl AppContext {
    /// Open the database and wire the Google provider into the engine.
    ///
    /// # Errors
    /// Fails when the database cannot be opened or migrated, or when the
    /// HTTP clients cannot be built from the configuration.
    pub fn new(config: Config) -> Result<Self> {
        let provider: Arc<dyn CalendarProvider> =
            Arc::new(GoogleCalendarProvider::new(&config.google)?);
        Self::with_provider(config, provider)
    }

    /// Same as [`AppContext::new`] with a caller-supplied provider.
    ///
    /// # Errors
    /// See [`AppContext::new`].
    pub fn with_provider(config: Config, provider: Arc<dyn CalendarProvider>) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(DbManager::from_config(&config.database)?);
        let accounts = Arc::new(SqliteAccountRepository::new(db.pool()));
        let calendars = Arc::new(SqliteCalendarRepository::new(db.pool()));

        let engine_config = SyncEngineConfig {
            renewal_margin: config.sync.renewal_margin(),
            callback_address: config.webhook_callback_url(),
            channel_ttl: config.sync.channel_ttl(),
            refresh_skew: config.sync.refresh_skew(),
        };
        if engine_config.callback_address.is_none() {
            info!("server.public_base_url not set; webhook channels will not be registered");
        }

        let mut engine =
            SyncEngine::new(calendars.clone(), accounts.clone(), provider, engine_config);
        if let Some(url) = config.downstream.url.as_deref() {
            let forwarder: Arc<dyn EventForwarder> =
                Arc::new(HttpEventForwarder::new(HttpClient::from_config(&config.google)?, url)?);
            engine = engine.with_forwarder(forwarder);
            info!(downstream = url, "forwarding synced events downstream");
        }

        info!(db_path = %db.path().display(), "application context ready");
        Ok(Self { config, db, accounts, calendars, engine: Arc::new(engine) })
    }

    /// Renewal scheduler driven by the configured cron expression.
    pub fn renewal_scheduler(&self) -> ChannelRenewalScheduler {
        ChannelRenewalScheduler::new(
            Arc::clone(&self.engine),
            RenewalSchedulerConfig::from(&self.config.sync),
        )
    }
}
