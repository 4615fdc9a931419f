//! Error types for web handlers.
//!
//! [`AppError`] is the HTTP face of [`TicketingError`]: every service error
//! converts into it with `?`, picking a status code and a stable `code` string
//! clients can branch on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use matchday_core::TicketingError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Receipt>, AppError> {
///     let receipt = state.reservations.purchase(id, buyer).await?;
///     Ok(Json(receipt.into()))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Offending input field, for validation errors
    field: Option<&'static str>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            field: None,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} {id} not found"),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Create a 422 Unprocessable Entity error for one input field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        let mut err = Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message);
        err.field = Some(field);
        err
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code of this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            field: self.field,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl From<TicketingError> for AppError {
    fn from(err: TicketingError) -> Self {
        match err {
            TicketingError::Validation { field, message } => Self::validation(field, message),
            TicketingError::NotFound { resource, id } => Self::not_found(resource, id),
            err @ TicketingError::Quota { .. } => {
                Self::new(StatusCode::CONFLICT, "QUOTA_EXCEEDED", err.to_string())
            }
            TicketingError::StateConflict(message) => Self::conflict(message),
            err @ TicketingError::WrongDay { .. } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "WRONG_DAY", err.to_string())
            }
            // Gateway details stay in the logs
            TicketingError::Gateway(source) => Self::new(
                StatusCode::BAD_GATEWAY,
                "PAYMENT_GATEWAY_ERROR",
                "The payment provider could not create a payment link",
            )
            .with_source(source.into()),
            TicketingError::Persistence(source) => {
                Self::internal("An internal error occurred").with_source(source.into())
            }
            err @ TicketingError::Aborted(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use matchday_core::gateway::GatewayError;
    use matchday_core::types::TicketId;
    use matchday_core::StoreError;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_validation_keeps_the_field() {
        let err: AppError = TicketingError::validation("amount", "must be between 1 and 4").into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.field, Some("amount"));
    }

    #[test]
    fn test_wrong_day_has_its_own_code() {
        let err: AppError = TicketingError::WrongDay {
            scheduled: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default(),
            today: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap_or_default(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "WRONG_DAY");
    }

    #[test]
    fn test_quota_and_conflict_are_409() {
        let quota: AppError = TicketingError::Quota {
            ticket_id: TicketId::new(),
            requested: 3,
            remaining: 1,
        }
        .into();
        assert_eq!(quota.status(), StatusCode::CONFLICT);
        assert_eq!(quota.code(), "QUOTA_EXCEEDED");

        let conflict: AppError = TicketingError::conflict("already used").into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_gateway_details_are_hidden() {
        let err: AppError = TicketingError::Gateway(GatewayError::Rejected {
            status: 400,
            error_code: "API_VALIDATION_ERROR".into(),
            message: "secret detail".into(),
        })
        .into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(!err.to_string().contains("secret detail"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_persistence_is_internal() {
        let err: AppError = TicketingError::Persistence(StoreError::Database("down".into())).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_aborted_task_is_internal() {
        let err: AppError = TicketingError::Aborted("task panicked".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "An internal error occurred");
    }
}
