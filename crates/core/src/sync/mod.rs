//! Incremental calendar sync

pub mod channels;
pub mod credentials;
pub mod engine;

pub use credentials::RefreshingClient;
pub use engine::{SyncEngine, SyncEngineConfig};
