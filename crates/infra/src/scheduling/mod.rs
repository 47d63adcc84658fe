//! Background scheduling
//!
//! The renewal scheduler keeps webhook channels alive. It has an explicit
//! start/stop lifecycle and a timeout around each run.

pub mod error;
pub mod renewal_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use renewal_scheduler::{ChannelRenewalScheduler, RenewalSchedulerConfig};
