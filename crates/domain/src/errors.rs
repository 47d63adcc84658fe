//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for calsync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalSyncError {
    /// Refresh token revoked or absent. Fatal for the current attempt.
    #[error("Credentials expired: {0}")]
    CredentialsExpired(String),

    /// The provider rejected the stored sync token; a full resync is needed.
    #[error("Sync token expired: {0}")]
    SyncTokenExpired(String),

    #[error("Watch registration failed: {0}")]
    WatchRegistrationFailed(String),

    /// Transient network failure, timeout or 5xx from the provider.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Raw authorization failure from the provider (HTTP 401).
    ///
    /// Consumed by the refresh decorator; callers outside the provider
    /// boundary only ever see [`CalSyncError::CredentialsExpired`].
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CalSyncError {
    /// Stable snake_case label used in logs and HTTP error bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CredentialsExpired(_) => "credentials_expired",
            Self::SyncTokenExpired(_) => "sync_token_expired",
            Self::WatchRegistrationFailed(_) => "watch_registration_failed",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same operation later may succeed without
    /// operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Database(_))
    }
}

/// Result type alias for calsync operations
pub type Result<T> = std::result::Result<T, CalSyncError>;
