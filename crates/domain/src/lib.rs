//! # calsync domain
//!
//! Domain types and models for the calendar sync backend.
//!
//! This crate contains:
//! - Account, calendar and event models
//! - Sync and webhook channel state types
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other calsync crates
//! - No I/O; pure data structures and derivations

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
