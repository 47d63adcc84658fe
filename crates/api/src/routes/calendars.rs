//! Admin endpoints for accounts, calendars and manual sync

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use calsync_core::CalendarRegistry;
use calsync_domain::{
    Account, AvailableCalendar, CalSyncError, Calendar, ConnectedAccount, CredentialOwner,
    NewAccount, NewCalendar, NewConnectedAccount, RenewalOutcome, SkipReason, StoredEvent,
    SyncOutcome,
};
use serde::Deserialize;
use tracing::info;

use super::{ApiError, SharedContext};

/// Admin routes, mounted under `/api` behind the admin guard.
pub fn router() -> Router<SharedContext> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/{id}/calendars", get(list_account_calendars))
        .route("/accounts/{id}/available-calendars", get(list_available_calendars))
        .route(
            "/accounts/{id}/connected-accounts",
            get(list_connected_accounts).post(create_connected_account),
        )
        .route("/accounts/{id}/connected-accounts/{cid}", delete(delete_connected_account))
        .route("/calendars", post(create_calendar))
        .route("/calendars/{id}", delete(delete_calendar).patch(update_calendar))
        .route("/calendars/{id}/sync", post(sync_calendar))
        .route("/calendars/{id}/channel", post(rotate_channel))
        .route("/calendars/{id}/events", get(list_events))
}

#[derive(Debug, Default, Deserialize)]
pub struct AvailableQuery {
    pub connected_account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarPatch {
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

/// POST /api/accounts
async fn create_account(
    State(ctx): State<SharedContext>,
    Json(new): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    if new.email.trim().is_empty() || new.access_token.is_empty() {
        return Err(ApiError::BadRequest("email and access_token are required".into()));
    }
    if let Some(existing) = ctx.accounts.find_account_by_email(&new.email).await? {
        return Err(CalSyncError::InvalidInput(format!(
            "email already registered to account {}",
            existing.id
        ))
        .into());
    }
    let account = ctx.accounts.create_account(new).await?;
    info!(account_id = %account.id, "account created");
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/accounts/{id}/calendars
async fn list_account_calendars(
    State(ctx): State<SharedContext>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<Calendar>>, ApiError> {
    require_account(&ctx, &account_id).await?;
    Ok(Json(ctx.calendars.list_calendars_for_account(&account_id).await?))
}

/// GET /api/accounts/{id}/available-calendars
///
/// Lists what the provider offers to the account's own credentials, or to
/// one of its connected accounts when `connected_account_id` is given.
async fn list_available_calendars(
    State(ctx): State<SharedContext>,
    Path(account_id): Path<String>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<Vec<AvailableCalendar>>, ApiError> {
    let owner = match query.connected_account_id {
        Some(connected_id) => {
            let connected = ctx
                .accounts
                .get_connected_account(&connected_id)
                .await?
                .filter(|connected| connected.account_id == account_id)
                .ok_or_else(|| {
                    CalSyncError::NotFound(format!("connected account {connected_id}"))
                })?;
            CredentialOwner::ConnectedAccount(connected.id)
        }
        None => {
            require_account(&ctx, &account_id).await?;
            CredentialOwner::Account(account_id)
        }
    };
    Ok(Json(ctx.engine.list_available_calendars(&owner).await?))
}

/// POST /api/accounts/{id}/connected-accounts
async fn create_connected_account(
    State(ctx): State<SharedContext>,
    Path(account_id): Path<String>,
    Json(new): Json<NewConnectedAccount>,
) -> Result<(StatusCode, Json<ConnectedAccount>), ApiError> {
    require_account(&ctx, &account_id).await?;
    let connected = ctx.accounts.create_connected_account(&account_id, new).await?;
    info!(%account_id, connected_account_id = %connected.id, "connected account added");
    Ok((StatusCode::CREATED, Json(connected)))
}

/// GET /api/accounts/{id}/connected-accounts
async fn list_connected_accounts(
    State(ctx): State<SharedContext>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<ConnectedAccount>>, ApiError> {
    require_account(&ctx, &account_id).await?;
    Ok(Json(ctx.accounts.list_connected_accounts(&account_id).await?))
}

/// DELETE /api/accounts/{id}/connected-accounts/{cid}
///
/// Calendars synced through the connected account go with it.
async fn delete_connected_account(
    State(ctx): State<SharedContext>,
    Path((account_id, connected_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let owned = ctx
        .accounts
        .get_connected_account(&connected_id)
        .await?
        .is_some_and(|connected| connected.account_id == account_id);
    if !owned || !ctx.accounts.delete_connected_account(&connected_id).await? {
        return Err(CalSyncError::NotFound(format!("connected account {connected_id}")).into());
    }
    info!(%account_id, connected_account_id = %connected_id, "connected account removed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/calendars
///
/// Re-adding a calendar that was deactivated turns it back on.
async fn create_calendar(
    State(ctx): State<SharedContext>,
    Json(new): Json<NewCalendar>,
) -> Result<(StatusCode, Json<Calendar>), ApiError> {
    if new.provider_calendar_id.trim().is_empty() {
        return Err(ApiError::BadRequest("provider_calendar_id is required".into()));
    }
    require_account(&ctx, &new.account_id).await?;

    let existing = ctx
        .calendars
        .get_calendar_by_provider_id(
            &new.account_id,
            new.connected_account_id.as_deref(),
            &new.provider_calendar_id,
        )
        .await?;
    if let Some(existing) = existing {
        if existing.is_active {
            return Err(CalSyncError::InvalidInput(format!(
                "calendar {} is already tracked as {}",
                new.provider_calendar_id, existing.id
            ))
            .into());
        }
        let calendar = set_active(&ctx, &existing.id, true).await?;
        info!(calendar_id = %calendar.id, "calendar reactivated");
        return Ok((StatusCode::OK, Json(calendar)));
    }

    let calendar = ctx.calendars.create_calendar(new).await?;
    info!(calendar_id = %calendar.id, "calendar registered");
    Ok((StatusCode::CREATED, Json(calendar)))
}

/// DELETE /api/calendars/{id}
async fn delete_calendar(
    State(ctx): State<SharedContext>,
    Path(calendar_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if ctx.calendars.delete_calendar(&calendar_id).await? {
        info!(%calendar_id, "calendar deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CalSyncError::NotFound(format!("calendar {calendar_id}")).into())
    }
}

/// PATCH /api/calendars/{id}
///
/// Inactive calendars keep their rows and events but are skipped by sync
/// and renewal.
async fn update_calendar(
    State(ctx): State<SharedContext>,
    Path(calendar_id): Path<String>,
    Json(patch): Json<CalendarPatch>,
) -> Result<Json<Calendar>, ApiError> {
    let calendar = set_active(&ctx, &calendar_id, patch.is_active).await?;
    info!(%calendar_id, is_active = calendar.is_active, "calendar updated");
    Ok(Json(calendar))
}

/// POST /api/calendars/{id}/sync
async fn sync_calendar(
    State(ctx): State<SharedContext>,
    Path(calendar_id): Path<String>,
) -> Result<Json<SyncOutcome>, ApiError> {
    match ctx.engine.sync_calendar(&calendar_id).await? {
        SyncOutcome::Skipped { reason: SkipReason::CalendarNotFound } => {
            Err(CalSyncError::NotFound(format!("calendar {calendar_id}")).into())
        }
        outcome => Ok(Json(outcome)),
    }
}

/// POST /api/calendars/{id}/channel
async fn rotate_channel(
    State(ctx): State<SharedContext>,
    Path(calendar_id): Path<String>,
) -> Result<Json<RenewalOutcome>, ApiError> {
    match ctx.engine.rotate_channel(&calendar_id).await? {
        RenewalOutcome::Skipped { reason: SkipReason::CalendarNotFound } => {
            Err(CalSyncError::NotFound(format!("calendar {calendar_id}")).into())
        }
        outcome => Ok(Json(outcome)),
    }
}

/// GET /api/calendars/{id}/events
async fn list_events(
    State(ctx): State<SharedContext>,
    Path(calendar_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    Ok(Json(ctx.calendars.list_events(&calendar_id, query.include_deleted).await?))
}

async fn set_active(
    ctx: &SharedContext,
    calendar_id: &str,
    active: bool,
) -> Result<Calendar, ApiError> {
    ctx.calendars.set_calendar_active(calendar_id, active).await?;
    ctx.calendars
        .get_calendar(calendar_id)
        .await?
        .ok_or_else(|| CalSyncError::NotFound(format!("calendar {calendar_id}")).into())
}

async fn require_account(ctx: &SharedContext, account_id: &str) -> Result<Account, ApiError> {
    ctx.accounts
        .get_account(account_id)
        .await?
        .ok_or_else(|| CalSyncError::NotFound(format!("account {account_id}")).into())
}
