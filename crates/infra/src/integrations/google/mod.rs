//! Google Calendar integration

pub mod provider;
mod types;

pub use provider::GoogleCalendarProvider;
