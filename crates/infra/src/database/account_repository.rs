//! SQLite-backed accounts, connected accounts and the TokenStore port.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::TokenStore;
use calsync_domain::{
    Account, CalSyncError, ConnectedAccount, CredentialOwner, Credentials, NewAccount,
    NewConnectedAccount, Result,
};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::pool::{SqliteConnection, SqlitePool};
use crate::errors::InfraError;

const ACCOUNT_COLUMNS: &str =
    "id, email, access_token, refresh_token, token_expiry, created_at";

const CONNECTED_ACCOUNT_COLUMNS: &str = "id, account_id, provider, provider_account_id, email, \
     access_token, refresh_token, token_expiry, created_at, updated_at";

/// Accounts and their OAuth credentials
pub struct SqliteAccountRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteAccountRepository {
    /// Create a new repository over a shared pool.
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<SqliteConnection> {
        Ok(self.pool.get().map_err(InfraError::from)?)
    }

    #[instrument(skip(self, new), fields(email = %new.email))]
    pub async fn create_account(&self, new: NewAccount) -> Result<Account> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            email: new.email,
            access_token: new.access_token,
            refresh_token: new.refresh_token,
            token_expiry: new.token_expiry,
            created_at: now,
        };

        conn.execute(
            "INSERT INTO accounts (id, email, access_token, refresh_token, token_expiry, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                account.id,
                account.email,
                account.access_token,
                account.refresh_token,
                account.token_expiry,
                now
            ],
        )
        .map_err(InfraError::from)?;

        info!(account_id = %account.id, "account created");
        Ok(account)
    }

    #[instrument(skip(self))]
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], map_account).optional().map_err(InfraError::from)?)
    }

    /// Emails are unique across accounts.
    #[instrument(skip(self))]
    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1");
        Ok(conn.query_row(&sql, params![email], map_account).optional().map_err(InfraError::from)?)
    }

    /// Link a provider identity to an account. Linking the same provider
    /// account twice fails with `InvalidInput`.
    #[instrument(skip(self, new), fields(provider = %new.provider))]
    pub async fn create_connected_account(
        &self,
        account_id: &str,
        new: NewConnectedAccount,
    ) -> Result<ConnectedAccount> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let connected = ConnectedAccount {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            provider: new.provider,
            provider_account_id: new.provider_account_id,
            email: new.email,
            access_token: new.access_token,
            refresh_token: new.refresh_token,
            token_expiry: new.token_expiry,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO connected_accounts (id, account_id, provider, provider_account_id, email,
                 access_token, refresh_token, token_expiry, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                connected.id,
                connected.account_id,
                connected.provider,
                connected.provider_account_id,
                connected.email,
                connected.access_token,
                connected.refresh_token,
                connected.token_expiry,
                now
            ],
        )
        .map_err(InfraError::from)?;

        info!(connected_account_id = %connected.id, account_id, "connected account linked");
        Ok(connected)
    }

    #[instrument(skip(self))]
    pub async fn get_connected_account(&self, id: &str) -> Result<Option<ConnectedAccount>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CONNECTED_ACCOUNT_COLUMNS} FROM connected_accounts WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id], map_connected_account)
            .optional()
            .map_err(InfraError::from)?)
    }

    /// Connected accounts of an account, oldest first.
    #[instrument(skip(self))]
    pub async fn list_connected_accounts(&self, account_id: &str) -> Result<Vec<ConnectedAccount>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CONNECTED_ACCOUNT_COLUMNS} FROM connected_accounts
             WHERE account_id = ?1 ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
        let rows = stmt
            .query_map(params![account_id], map_connected_account)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;
        Ok(rows)
    }

    /// Remove a connected account and, through the cascade, its calendars.
    #[instrument(skip(self))]
    pub async fn delete_connected_account(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM connected_accounts WHERE id = ?1", params![id])
            .map_err(InfraError::from)?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl TokenStore for SqliteAccountRepository {
    #[instrument(skip(self), fields(owner_kind = owner.kind(), owner_id = owner.id()))]
    async fn get_credentials(&self, owner: &CredentialOwner) -> Result<Option<Credentials>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT access_token, refresh_token, token_expiry FROM {} WHERE id = ?1",
            credential_table(owner)
        );

        let credentials = conn
            .query_row(&sql, params![owner.id()], |row| {
                Ok(Credentials {
                    owner: owner.clone(),
                    access_token: row.get(0)?,
                    refresh_token: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            })
            .optional()
            .map_err(InfraError::from)?;

        debug!(found = credentials.is_some(), "credentials lookup");
        Ok(credentials)
    }

    #[instrument(skip(self, access_token, refresh_token), fields(owner_kind = owner.kind(), owner_id = owner.id()))]
    async fn update_credentials(
        &self,
        owner: &CredentialOwner,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let sql = format!(
            "UPDATE {} SET access_token = ?1, refresh_token = COALESCE(?2, refresh_token),
                 token_expiry = ?3, updated_at = ?4
             WHERE id = ?5",
            credential_table(owner)
        );

        let updated = conn
            .execute(
                &sql,
                params![access_token, refresh_token, expires_at, Utc::now().timestamp(), owner.id()],
            )
            .map_err(InfraError::from)?;

        if updated == 0 {
            return Err(CalSyncError::NotFound(format!("{} {}", owner.kind(), owner.id())));
        }

        debug!(rotated = refresh_token.is_some(), "credentials updated");
        Ok(())
    }
}

fn credential_table(owner: &CredentialOwner) -> &'static str {
    match owner {
        CredentialOwner::Account(_) => "accounts",
        CredentialOwner::ConnectedAccount(_) => "connected_accounts",
    }
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        access_token: row.get(2)?,
        refresh_token: row.get(3)?,
        token_expiry: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_connected_account(row: &Row<'_>) -> rusqlite::Result<ConnectedAccount> {
    Ok(ConnectedAccount {
        id: row.get(0)?,
        account_id: row.get(1)?,
        provider: row.get(2)?,
        provider_account_id: row.get(3)?,
        email: row.get(4)?,
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
        token_expiry: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
