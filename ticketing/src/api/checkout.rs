//! Checkout API endpoints.
//!
//! - POST /api/tickets/:ticket_id/purchases - Buy admissions for one match day
//! - POST /api/series/:series_id/purchases - Buy the whole series at the package price
//!
//! The buyer comes from `X-Member-Id`. A paid product answers with the
//! gateway's payment page; a free one is created without a link.

#![allow(clippy::missing_errors_doc)] // Axum handlers return AppError

use super::purchases::PurchaseResponse;
use crate::server::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use matchday_core::types::{Product, SeriesId, TicketId};
use matchday_web::{AppError, MemberIdentity};
use serde::Deserialize;
use uuid::Uuid;

/// Request body for both checkout endpoints.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Admissions per ticket
    pub amount: u32,
}

/// Buy `amount` admissions for one match day.
///
/// # Errors
///
/// - 401 without `X-Member-Id`
/// - 404 unknown ticket or member
/// - 409 not enough tickets left
/// - 422 `amount` out of range
/// - 502 the payment gateway failed
pub async fn buy_ticket(
    State(state): State<AppState>,
    MemberIdentity(buyer): MemberIdentity,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let purchase = state
        .reservations
        .reserve(
            &buyer,
            Product::Ticket(TicketId::from_uuid(ticket_id)),
            request.amount,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(purchase.into())))
}

/// Buy `amount` admissions for every match day in a series.
///
/// # Errors
///
/// Same as [`buy_ticket`]; a series with no tickets is a 422.
pub async fn buy_series(
    State(state): State<AppState>,
    MemberIdentity(buyer): MemberIdentity,
    Path(series_id): Path<Uuid>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let purchase = state
        .reservations
        .reserve(
            &buyer,
            Product::Series(SeriesId::from_uuid(series_id)),
            request.amount,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(purchase.into())))
}
