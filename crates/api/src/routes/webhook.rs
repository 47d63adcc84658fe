//! Google push notification receiver
//!
//! Notifications carry no event data, only channel headers. The handler
//! resolves the channel to a calendar and runs one sync. Only transient
//! failures produce a non-2xx answer, since Google redelivers those.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use calsync_domain::{NotificationOutcome, WebhookNotification};
use tracing::{debug, error, info};

use super::{ApiError, SharedContext};

pub const RESOURCE_ID_HEADER: &str = "x-goog-resource-id";
pub const CHANNEL_ID_HEADER: &str = "x-goog-channel-id";
pub const RESOURCE_STATE_HEADER: &str = "x-goog-resource-state";
pub const MESSAGE_NUMBER_HEADER: &str = "x-goog-message-number";

/// Provider push notification endpoint.
pub fn router() -> Router<SharedContext> {
    Router::new().route("/webhooks/google", post(receive_google))
}

/// POST /webhooks/google
async fn receive_google(
    State(ctx): State<SharedContext>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let notification = parse_notification(&headers)?;

    match ctx.engine.handle_notification(&notification).await {
        Ok(NotificationOutcome::Ignored { reason }) => {
            debug!(resource_id = %notification.resource_id, ?reason, "notification ignored");
            Ok(StatusCode::OK)
        }
        Ok(NotificationOutcome::Synced { calendar_id, sync }) => {
            info!(
                %calendar_id,
                state = notification.resource_state.as_deref().unwrap_or("unknown"),
                changes = sync.summary().map_or(0, |s| s.total()),
                "notification processed"
            );
            Ok(StatusCode::OK)
        }
        Err(err) if err.is_transient() => Err(err.into()),
        Err(err) => {
            error!(
                resource_id = %notification.resource_id,
                error = %err,
                label = err.label(),
                "notification sync failed"
            );
            Ok(StatusCode::OK)
        }
    }
}

fn parse_notification(headers: &HeaderMap) -> Result<WebhookNotification, ApiError> {
    let resource_id = header_value(headers, RESOURCE_ID_HEADER)
        .ok_or_else(|| ApiError::BadRequest("missing X-Goog-Resource-ID header".into()))?;

    Ok(WebhookNotification {
        resource_id,
        channel_id: header_value(headers, CHANNEL_ID_HEADER),
        resource_state: header_value(headers, RESOURCE_STATE_HEADER),
        message_number: header_value(headers, MESSAGE_NUMBER_HEADER)
            .and_then(|value| value.parse().ok()),
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
