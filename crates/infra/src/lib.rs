//! # calsync infrastructure
//!
//! Infrastructure implementations of the core ports.
//!
//! This crate contains:
//! - SQLite persistence (rusqlite behind an r2d2 pool)
//! - The Google Calendar provider and the downstream event forwarder
//! - The retrying HTTP client they share
//! - Configuration loading and the channel renewal scheduler
//!
//! ## Architecture
//! - Implements traits defined in `calsync-core`
//! - Contains all "impure" code (I/O, network, filesystem)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;

pub use database::{DbManager, SqliteAccountRepository, SqliteCalendarRepository};
pub use errors::InfraError;
pub use http::HttpClient;
pub use integrations::{GoogleCalendarProvider, HttpEventForwarder};
pub use scheduling::{ChannelRenewalScheduler, RenewalSchedulerConfig, SchedulerError};
