//! r2d2 pool of SQLite connections
//!
//! Every pooled connection gets WAL journaling, foreign keys and a busy
//! timeout so concurrent writers queue instead of failing immediately.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use calsync_domain::{CalSyncError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{info, instrument, warn};

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// Pool tuning
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Build a pool for the database file at `path`, creating it if missing.
#[instrument(skip_all, fields(db_path = %path.as_ref().display(), pool_size = config.max_size))]
pub fn create_sqlite_pool<P: AsRef<Path> + std::fmt::Debug>(
    path: P,
    config: PoolConfig,
) -> Result<Arc<SqlitePool>> {
    let busy_timeout = config.busy_timeout;
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(move |conn| apply_connection_pragmas(conn, busy_timeout));

    let pool = Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|err| {
            warn!(error = %err, "failed to create sqlite pool");
            CalSyncError::Database(format!("failed to create pool: {err}"))
        })?;

    info!("sqlite pool created");
    Ok(Arc::new(pool))
}

fn apply_connection_pragmas(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )?;
    conn.busy_timeout(busy_timeout)
}
