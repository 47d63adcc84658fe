//! HTTP client shared by provider and downstream integrations

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
