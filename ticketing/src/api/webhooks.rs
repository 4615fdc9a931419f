//! Payment gateway callback.
//!
//! - POST /api/webhooks/payments - Settle a purchase from a payment notification
//!
//! The gateway retries anything that is not a 2xx, so the status codes are
//! chosen for it:
//! - 200 for an applied transition, and for a duplicate (stop redelivering)
//! - 401 for a missing or wrong `X-Callback-Token`
//! - 404 for an unknown invoice
//! - 500 for a storage failure (redelivery is safe)

#![allow(clippy::missing_errors_doc)] // Axum handlers return AppError

use crate::server::state::AppState;
use axum::{extract::State, Json};
use matchday_core::settlement::{PaymentNotification, SettlementOutcome};
use matchday_core::TicketingError;
use matchday_web::{AppError, CallbackToken};
use serde::Serialize;

/// Acknowledgement returned to the gateway.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    /// `paid`, `failed` or `duplicate`
    pub status: &'static str,
    /// Units issued by this notification
    pub units_issued: usize,
    /// Human-readable detail
    pub message: String,
}

/// Apply a payment notification.
///
/// # Errors
///
/// - 401 bad callback token
/// - 404 unknown invoice
/// - 500 storage failure
pub async fn payment_notification(
    State(state): State<AppState>,
    token: CallbackToken,
    Json(notification): Json<PaymentNotification>,
) -> Result<Json<WebhookAck>, AppError> {
    // An unset secret accepts nothing.
    if state.callback_token.is_empty() || !token.matches(&state.callback_token) {
        tracing::warn!(external_id = %notification.external_id, "Webhook with bad callback token");
        return Err(AppError::unauthorized("invalid callback token"));
    }

    let external_id = notification.external_id.clone();

    match state.settlements.handle_notification(notification).await {
        Ok(outcome) => Ok(Json(WebhookAck {
            status: outcome.as_str(),
            units_issued: match outcome {
                SettlementOutcome::Paid { units_issued } => units_issued,
                SettlementOutcome::Failed { .. } => 0,
            },
            message: format!("purchase {external_id} settled"),
        })),
        Err(TicketingError::StateConflict(message)) => Ok(Json(WebhookAck {
            status: "duplicate",
            units_issued: 0,
            message,
        })),
        Err(err) => Err(err.into()),
    }
}
