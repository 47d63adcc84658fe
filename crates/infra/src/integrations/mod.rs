//! External service integrations

pub mod downstream;
pub mod google;

pub use downstream::HttpEventForwarder;
pub use google::GoogleCalendarProvider;
