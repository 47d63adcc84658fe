//! HTTP routes
//!
//! `/webhooks/google` and `/health` are public. Everything under `/api`
//! requires the admin bearer token when one is configured.

pub mod calendars;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use calsync_domain::CalSyncError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::AppContext;

/// Shared state handed to every handler
pub type SharedContext = Arc<AppContext>;

/// Build the full application router.
pub fn router(ctx: SharedContext) -> Router {
    let admin = calendars::router()
        .route_layer(middleware::from_fn_with_state(Arc::clone(&ctx), require_admin));

    Router::new()
        .merge(webhook::router())
        .merge(health::router())
        .nest("/api", admin)
        .with_state(ctx)
}

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Errors a handler can return; rendered as [`ErrorBody`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] CalSyncError),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid admin token")]
    AdminUnauthorized,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::AdminUnauthorized => StatusCode::UNAUTHORIZED,
            Self::Domain(err) => match err {
                CalSyncError::NotFound(_) => StatusCode::NOT_FOUND,
                CalSyncError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                // The account must be reconnected before this can succeed.
                CalSyncError::CredentialsExpired(_) | CalSyncError::Unauthorized(_) => {
                    StatusCode::CONFLICT
                }
                CalSyncError::WatchRegistrationFailed(_) | CalSyncError::SyncTokenExpired(_) => {
                    StatusCode::BAD_GATEWAY
                }
                CalSyncError::ProviderUnavailable(_) | CalSyncError::Database(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CalSyncError::Config(_) | CalSyncError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Domain(err) => err.label(),
            Self::BadRequest(_) => "bad_request",
            Self::AdminUnauthorized => "unauthorized",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, label = self.label(), "request failed");
        } else {
            warn!(error = %self, label = self.label(), "request rejected");
        }
        let body = ErrorBody { error: self.label(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

/// Reject admin requests without the configured bearer token.
async fn require_admin(
    State(ctx): State<SharedContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = ctx.config.server.admin_token.as_deref() {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if presented != Some(expected) {
            return Err(ApiError::AdminUnauthorized);
        }
    }
    Ok(next.run(request).await)
}
