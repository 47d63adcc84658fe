//! # calsync API
//!
//! HTTP surface and composition root.
//!
//! This crate contains:
//! - The webhook receiver the provider posts change notifications to
//! - Admin routes for accounts, calendars and manual sync
//! - Application context (dependency injection)
//! - Tracing initialisation for the `calsync` binary
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires the SQLite registry and the Google provider into the sync engine

pub mod context;
pub mod routes;
pub mod utils;

pub use context::AppContext;
pub use routes::{router, ApiError};
