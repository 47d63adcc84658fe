//! SQLite persistence: pool, schema and repositories.

pub mod account_repository;
pub mod calendar_repository;
pub mod manager;
pub mod pool;

pub use account_repository::SqliteAccountRepository;
pub use calendar_repository::SqliteCalendarRepository;
pub use manager::DbManager;
pub use pool::{create_sqlite_pool, PoolConfig, SqliteConnection, SqlitePool};
