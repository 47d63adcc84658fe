//! # calsync core
//!
//! Sync engine and port definitions - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces for the provider, registry and token store
//! - The credential refresh decorator around the provider
//! - The sync engine: incremental reconciliation and webhook channel
//!   lifecycle
//!
//! ## Architecture Principles
//! - Only depends on `calsync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod calendar_ports;
pub mod clock;
pub mod sync;

pub use calendar_ports::{
    CalendarProvider, CalendarRegistry, EventForwarder, NoopForwarder, TokenStore,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use sync::{RefreshingClient, SyncEngine, SyncEngineConfig};
