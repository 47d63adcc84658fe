//! SQLite implementation of the CalendarRegistry port, plus the calendar
//! and event queries used by the HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::CalendarRegistry;
use calsync_domain::{
    CalSyncError, Calendar, EventStatus, NewCalendar, ProviderEvent, Result, StoredEvent,
    UpsertOutcome, WebhookChannel,
};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::pool::{SqliteConnection, SqlitePool};
use crate::errors::InfraError;

const CALENDAR_COLUMNS: &str = "id, account_id, connected_account_id, provider, \
     provider_calendar_id, name, color, is_primary, is_active, sync_token, \
     webhook_channel_id, webhook_resource_id, webhook_expiry, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, calendar_id, provider_event_id, title, description, location, \
     start_time, end_time, is_all_day, status, recurrence, attendees, etag, raw_data, \
     deleted_at, created_at, updated_at";

// A cancelled delta usually carries only id and status: keep what is
// already stored for the descriptive columns and the raw payload, and
// stamp deleted_at once.
const UPSERT_EVENT_SQL: &str = "INSERT INTO events (
        id, calendar_id, provider_event_id, title, description, location,
        start_time, end_time, is_all_day, status, recurrence, attendees, etag,
        raw_data, deleted_at, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
    ON CONFLICT(calendar_id, provider_event_id) DO UPDATE SET
        title = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(excluded.title, events.title) ELSE excluded.title END,
        description = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(excluded.description, events.description) ELSE excluded.description END,
        location = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(excluded.location, events.location) ELSE excluded.location END,
        start_time = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(excluded.start_time, events.start_time) ELSE excluded.start_time END,
        end_time = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(excluded.end_time, events.end_time) ELSE excluded.end_time END,
        is_all_day = CASE WHEN excluded.status = 'cancelled'
            THEN events.is_all_day ELSE excluded.is_all_day END,
        recurrence = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(excluded.recurrence, events.recurrence) ELSE excluded.recurrence END,
        attendees = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(excluded.attendees, events.attendees) ELSE excluded.attendees END,
        status = excluded.status,
        etag = excluded.etag,
        raw_data = CASE WHEN excluded.status = 'cancelled'
            THEN events.raw_data ELSE excluded.raw_data END,
        deleted_at = CASE WHEN excluded.status = 'cancelled'
            THEN COALESCE(events.deleted_at, excluded.deleted_at) ELSE NULL END,
        updated_at = excluded.updated_at";

/// Calendars, their webhook channels and materialized events
pub struct SqliteCalendarRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCalendarRepository {
    /// Create a new repository over a shared pool.
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<SqliteConnection> {
        Ok(self.pool.get().map_err(InfraError::from)?)
    }

    fn query_calendars(
        &self,
        where_clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Calendar>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CALENDAR_COLUMNS} FROM calendars {where_clause}");
        let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
        let calendars = stmt
            .query_map(params, map_calendar)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;
        Ok(calendars)
    }

    fn touch(&self, sql: &str, id: &str, params: impl rusqlite::Params) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(sql, params).map_err(InfraError::from)?;
        if updated == 0 {
            return Err(CalSyncError::NotFound(format!("calendar {id}")));
        }
        Ok(())
    }

    /// Start tracking a provider calendar. Tracking the same provider
    /// calendar twice under one account fails with `InvalidInput`.
    #[instrument(skip(self, new), fields(account_id = %new.account_id, provider_calendar_id = %new.provider_calendar_id))]
    pub async fn create_calendar(&self, new: NewCalendar) -> Result<Calendar> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();
        let calendar = Calendar {
            id: Uuid::new_v4().to_string(),
            account_id: new.account_id,
            connected_account_id: new.connected_account_id,
            provider: new.provider,
            provider_calendar_id: new.provider_calendar_id,
            name: new.name,
            color: new.color,
            is_primary: new.is_primary,
            is_active: true,
            sync_token: None,
            webhook: None,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO calendars (id, account_id, connected_account_id, provider,
                 provider_calendar_id, name, color, is_primary, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)",
            params![
                calendar.id,
                calendar.account_id,
                calendar.connected_account_id,
                calendar.provider,
                calendar.provider_calendar_id,
                calendar.name,
                calendar.color,
                calendar.is_primary,
                now
            ],
        )
        .map_err(InfraError::from)?;

        info!(calendar_id = %calendar.id, "calendar tracked");
        Ok(calendar)
    }

    /// Active calendars of an account, primary first then by name
    #[instrument(skip(self))]
    pub async fn list_calendars_for_account(&self, account_id: &str) -> Result<Vec<Calendar>> {
        self.query_calendars(
            "WHERE account_id = ?1 AND is_active = 1 ORDER BY is_primary DESC, name, id",
            params![account_id],
        )
    }

    /// Look up a tracked calendar by its owner and provider calendar id, active or not.
    #[instrument(skip(self))]
    pub async fn get_calendar_by_provider_id(
        &self,
        account_id: &str,
        connected_account_id: Option<&str>,
        provider_calendar_id: &str,
    ) -> Result<Option<Calendar>> {
        let mut found = self.query_calendars(
            "WHERE account_id = ?1 AND COALESCE(connected_account_id, '') = COALESCE(?2, '')
                 AND provider_calendar_id = ?3",
            params![account_id, connected_account_id, provider_calendar_id],
        )?;
        Ok(found.pop())
    }

    /// Soft removal and restore. Fails with `NotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn set_calendar_active(&self, id: &str, active: bool) -> Result<()> {
        self.touch(
            "UPDATE calendars SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            id,
            params![active, Utc::now().timestamp(), id],
        )
    }

    /// Delete a calendar and, through the cascade, its events.
    #[instrument(skip(self))]
    pub async fn delete_calendar(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM calendars WHERE id = ?1", params![id])
            .map_err(InfraError::from)?;
        if deleted > 0 {
            info!(calendar_id = id, "calendar deleted");
        }
        Ok(deleted > 0)
    }

    /// Materialized events ordered by start time. Soft-deleted rows are
    /// included only on request.
    #[instrument(skip(self))]
    pub async fn list_events(
        &self,
        calendar_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<StoredEvent>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE calendar_id = ?1 AND (?2 OR deleted_at IS NULL)
             ORDER BY start_time IS NULL, start_time, provider_event_id"
        );
        let mut stmt = conn.prepare(&sql).map_err(InfraError::from)?;
        let events = stmt
            .query_map(params![calendar_id, include_deleted], map_event)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;
        Ok(events)
    }
}

#[async_trait]
impl CalendarRegistry for SqliteCalendarRepository {
    #[instrument(skip(self))]
    async fn get_calendar(&self, id: &str) -> Result<Option<Calendar>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CALENDAR_COLUMNS} FROM calendars WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], map_calendar).optional().map_err(InfraError::from)?)
    }

    #[instrument(skip(self))]
    async fn get_calendar_by_webhook_resource_id(
        &self,
        resource_id: &str,
    ) -> Result<Option<Calendar>> {
        let mut found = self.query_calendars(
            "WHERE webhook_resource_id = ?1 AND is_active = 1 ORDER BY updated_at DESC LIMIT 1",
            params![resource_id],
        )?;
        Ok(found.pop())
    }

    #[instrument(skip(self))]
    async fn list_calendars_due_for_renewal(&self, deadline: i64) -> Result<Vec<Calendar>> {
        let due = self.query_calendars(
            "WHERE is_active = 1 AND (webhook_expiry IS NULL OR webhook_expiry < ?1)
             ORDER BY webhook_expiry IS NOT NULL, webhook_expiry, id",
            params![deadline],
        )?;
        debug!(count = due.len(), "calendars due for channel renewal");
        Ok(due)
    }

    #[instrument(skip(self, sync_token))]
    async fn update_sync_token(&self, id: &str, sync_token: &str) -> Result<()> {
        self.touch(
            "UPDATE calendars SET sync_token = ?1, updated_at = ?2 WHERE id = ?3",
            id,
            params![sync_token, Utc::now().timestamp(), id],
        )
    }

    #[instrument(skip(self))]
    async fn clear_sync_token(&self, id: &str) -> Result<()> {
        self.touch(
            "UPDATE calendars SET sync_token = NULL, updated_at = ?1 WHERE id = ?2",
            id,
            params![Utc::now().timestamp(), id],
        )
    }

    #[instrument(skip(self, channel), fields(channel_id = %channel.channel_id, expires_at = channel.expires_at))]
    async fn update_webhook_channel(&self, id: &str, channel: &WebhookChannel) -> Result<()> {
        self.touch(
            "UPDATE calendars SET webhook_channel_id = ?1, webhook_resource_id = ?2,
                 webhook_expiry = ?3, updated_at = ?4
             WHERE id = ?5",
            id,
            params![
                channel.channel_id,
                channel.resource_id,
                channel.expires_at,
                Utc::now().timestamp(),
                id
            ],
        )
    }

    #[instrument(skip(self))]
    async fn clear_webhook_channel(&self, id: &str) -> Result<()> {
        self.touch(
            "UPDATE calendars SET webhook_channel_id = NULL, webhook_resource_id = NULL,
                 webhook_expiry = NULL, updated_at = ?1
             WHERE id = ?2",
            id,
            params![Utc::now().timestamp(), id],
        )
    }

    #[instrument(skip(self, event), fields(provider_event_id = %event.provider_event_id, status = event.status.as_str()))]
    async fn upsert_event(
        &self,
        calendar_id: &str,
        event: &ProviderEvent,
    ) -> Result<UpsertOutcome> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM events WHERE calendar_id = ?1 AND provider_event_id = ?2)",
                params![calendar_id, event.provider_event_id],
                |row| row.get(0),
            )
            .map_err(InfraError::from)?;

        let deleted_at = event.status.is_cancelled().then_some(now);
        conn.execute(
            UPSERT_EVENT_SQL,
            params![
                Uuid::new_v4().to_string(),
                calendar_id,
                event.provider_event_id,
                event.title,
                event.description,
                event.location,
                event.start_time,
                event.end_time,
                event.is_all_day,
                event.status.as_str(),
                event.recurrence,
                event.attendees,
                event.etag,
                event.raw_data,
                deleted_at,
                now
            ],
        )
        .map_err(InfraError::from)?;

        Ok(if exists { UpsertOutcome::Updated } else { UpsertOutcome::Created })
    }
}

fn map_calendar(row: &Row<'_>) -> rusqlite::Result<Calendar> {
    let channel_id: Option<String> = row.get(10)?;
    let resource_id: Option<String> = row.get(11)?;
    let expiry: Option<i64> = row.get(12)?;
    let webhook = match (channel_id, resource_id, expiry) {
        (Some(channel_id), Some(resource_id), Some(expires_at)) => {
            Some(WebhookChannel { channel_id, resource_id, expires_at })
        }
        _ => None,
    };

    Ok(Calendar {
        id: row.get(0)?,
        account_id: row.get(1)?,
        connected_account_id: row.get(2)?,
        provider: row.get(3)?,
        provider_calendar_id: row.get(4)?,
        name: row.get(5)?,
        color: row.get(6)?,
        is_primary: row.get(7)?,
        is_active: row.get(8)?,
        sync_token: row.get(9)?,
        webhook,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let status: String = row.get(9)?;
    Ok(StoredEvent {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        provider_event_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        is_all_day: row.get(8)?,
        status: EventStatus::from_provider(&status),
        recurrence: row.get(10)?,
        attendees: row.get(11)?,
        etag: row.get(12)?,
        raw_data: row.get(13)?,
        deleted_at: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}
