//! Accounts, connected accounts and their OAuth credentials

use serde::{Deserialize, Serialize};

/// Primary login identity. Tokens are owned by the identity layer and
/// updated on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub token_expiry: Option<i64>,
    pub created_at: i64,
}

/// Input for creating an [`Account`]
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<i64>,
}

/// A secondary provider identity linked to an [`Account`].
///
/// Unique per (account, provider, provider account id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    pub account_id: String,
    pub provider: String,
    pub provider_account_id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub token_expiry: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for linking a [`ConnectedAccount`]
#[derive(Debug, Clone, Deserialize)]
pub struct NewConnectedAccount {
    pub provider: String,
    pub provider_account_id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<i64>,
}

/// Which row holds the credentials for a calendar
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CredentialOwner {
    Account(String),
    ConnectedAccount(String),
}

impl CredentialOwner {
    pub fn id(&self) -> &str {
        match self {
            Self::Account(id) | Self::ConnectedAccount(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Account(_) => "account",
            Self::ConnectedAccount(_) => "connected_account",
        }
    }
}

/// Live OAuth credentials for one owner
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub owner: CredentialOwner,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Access token expiry in epoch seconds, when known.
    pub expires_at: Option<i64>,
}

impl Credentials {
    /// True once `now` is within `skew_secs` of the known expiry.
    ///
    /// Unknown expiry is treated as valid; the provider answers 401 if not.
    pub fn is_expired(&self, now: i64, skew_secs: i64) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry.saturating_sub(skew_secs))
    }

    /// Fold a refresh response into these credentials.
    ///
    /// The refresh token is only replaced when the provider rotated it.
    pub fn apply_refresh(&mut self, refreshed: &RefreshedToken, now: i64) {
        self.access_token.clone_from(&refreshed.access_token);
        if let Some(rotated) = &refreshed.refresh_token {
            self.refresh_token = Some(rotated.clone());
        }
        self.expires_at = refreshed.expires_in.map(|secs| now + secs);
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("owner", &self.owner)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Result of exchanging a refresh token
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    /// Lifetime of the new access token in seconds.
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("rotated", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}
