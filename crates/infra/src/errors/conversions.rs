//! Conversions from external infrastructure errors into domain errors.

use calsync_domain::CalSyncError;
use reqwest::Error as HttpError;
use reqwest::StatusCode;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CalSyncError);

impl From<InfraError> for CalSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CalSyncError> for InfraError {
    fn from(value: CalSyncError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCalSyncError {
    fn into_calsync(self) -> CalSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CalSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCalSyncError for SqlError {
    fn into_calsync(self) -> CalSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CalSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CalSyncError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        CalSyncError::InvalidInput(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => CalSyncError::InvalidInput(
                        "foreign key constraint violation".into(),
                    ),
                    _ => CalSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CalSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CalSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CalSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => CalSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => CalSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_calsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CalSyncError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(CalSyncError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CalSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCalSyncError for HttpError {
    fn into_calsync(self) -> CalSyncError {
        if self.is_timeout() {
            return CalSyncError::ProviderUnavailable("HTTP request timed out".into());
        }

        if self.is_connect() {
            return CalSyncError::ProviderUnavailable("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            return status_error(status, "");
        }

        if self.is_decode() {
            return CalSyncError::Internal(format!("unexpected provider response: {self}"));
        }

        CalSyncError::ProviderUnavailable(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_calsync())
    }
}

/// Error reasons Google attaches to a 403 when a quota is exhausted.
const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

/// Map a non-success HTTP status to the domain taxonomy.
///
/// `detail` is appended to the message (typically the provider's error
/// body, already truncated by the caller). A 403 carrying a rate-limit
/// reason is throttling, not a permission problem.
pub fn status_error(status: StatusCode, detail: &str) -> CalSyncError {
    let code = status.as_u16();
    let mut message =
        format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
    if !detail.is_empty() {
        message.push_str(": ");
        message.push_str(detail);
    }

    match code {
        401 => CalSyncError::Unauthorized(message),
        404 => CalSyncError::NotFound(message),
        410 => CalSyncError::SyncTokenExpired(message),
        408 | 429 => CalSyncError::ProviderUnavailable(message),
        403 if RATE_LIMIT_REASONS.iter().any(|reason| detail.contains(reason)) => {
            CalSyncError::ProviderUnavailable(message)
        }
        400..=499 => CalSyncError::InvalidInput(message),
        _ => CalSyncError::ProviderUnavailable(message),
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::Client;
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn sqlite_busy_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let mapped: CalSyncError = InfraError::from(err).into();
        match mapped {
            CalSyncError::Database(msg) => {
                assert!(msg.contains("busy") || msg.contains("locked"));
            }
            other => panic!("expected database error, got {:?}", other),
        }
    }

    #[test]
    fn unique_violation_maps_to_invalid_input() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::ConstraintViolation, extended_code: 2067 },
            Some("UNIQUE constraint failed: accounts.email".into()),
        );

        let mapped: CalSyncError = InfraError::from(err).into();
        assert!(matches!(mapped, CalSyncError::InvalidInput(msg) if msg.contains("accounts.email")));
    }

    #[test]
    fn status_mapping_follows_provider_semantics() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            CalSyncError::Unauthorized(_)
        ));
        assert!(matches!(status_error(StatusCode::GONE, ""), CalSyncError::SyncTokenExpired(_)));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            CalSyncError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            CalSyncError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad"),
            CalSyncError::InvalidInput(msg) if msg.ends_with(": bad")
        ));
    }

    #[test]
    fn rate_limited_403_is_transient() {
        let body = r#"{"error":{"errors":[{"domain":"usageLimits","reason":"userRateLimitExceeded"}],"code":403}}"#;
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, body),
            CalSyncError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, r#"{"error":{"errors":[{"reason":"rateLimitExceeded"}]}}"#),
            CalSyncError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, r#"{"error":{"errors":[{"reason":"forbidden"}]}}"#),
            CalSyncError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn http_status_401_maps_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: CalSyncError = InfraError::from(error).into();
        match mapped {
            CalSyncError::Unauthorized(msg) => assert!(msg.contains("401")),
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }
}
