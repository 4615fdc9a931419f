//! Buyer receipts.
//!
//! - GET /api/purchases/:purchase_id - A buyer's own purchase and its codes

#![allow(clippy::missing_errors_doc)] // Axum handlers return AppError

use crate::server::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use matchday_core::types::{Purchase, PurchaseId, PurchaseStatus, TicketPurchase};
use matchday_web::{AppError, MemberIdentity};
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// Response Types
// ============================================================================

/// One ticket line of a purchase.
#[derive(Debug, Serialize)]
pub struct TicketLine {
    /// Ticket ID
    pub ticket_id: Uuid,
    /// Ticket name
    pub name: String,
    /// Match day
    pub match_date: NaiveDate,
    /// Venue name
    pub venue: String,
    /// Venue city
    pub city: String,
}

/// Purchase details.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// Purchase ID
    pub purchase_id: Uuid,
    /// Invoice reference
    pub external_id: String,
    /// Lifecycle status
    pub status: PurchaseStatus,
    /// Season name
    pub season: String,
    /// Series name
    pub series: String,
    /// Ticket lines
    pub tickets: Vec<TicketLine>,
    /// Admissions per ticket line
    pub amount: u32,
    /// Unit price in rupiah
    pub price: u64,
    /// Total in rupiah
    pub grand_total: u64,
    /// Hosted payment page; absent for free tickets
    pub payment_url: Option<String>,
    /// When the payment link stops working
    pub expires_at: Option<DateTime<Utc>>,
    /// When the payment arrived
    pub paid_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl From<Purchase> for PurchaseResponse {
    fn from(purchase: Purchase) -> Self {
        Self {
            purchase_id: *purchase.id.as_uuid(),
            external_id: purchase.invoice.external_id,
            status: purchase.status,
            season: purchase.season.name,
            series: purchase.series.name,
            tickets: purchase
                .tickets
                .into_iter()
                .map(|ticket| TicketLine {
                    ticket_id: *ticket.ticket_id.as_uuid(),
                    name: ticket.name,
                    match_date: ticket.match_date,
                    venue: ticket.venue.name,
                    city: ticket.venue.city,
                })
                .collect(),
            amount: purchase.amount,
            price: purchase.price.rupiah(),
            grand_total: purchase.grand_total.rupiah(),
            payment_url: purchase.invoice.payment_url,
            expires_at: purchase.expires_at,
            paid_at: purchase.paid_at,
            created_at: purchase.created_at,
        }
    }
}

/// One redeemable admission.
#[derive(Debug, Serialize)]
pub struct UnitResponse {
    /// Unit ID
    pub id: Uuid,
    /// Redemption code
    pub code: String,
    /// Ticket name
    pub ticket: String,
    /// Match day
    pub match_date: NaiveDate,
    /// Venue name
    pub venue: String,
    /// Whether it was redeemed
    pub is_used: bool,
    /// When it was redeemed
    pub used_at: Option<DateTime<Utc>>,
}

impl From<TicketPurchase> for UnitResponse {
    fn from(unit: TicketPurchase) -> Self {
        Self {
            id: *unit.id.as_uuid(),
            code: unit.code,
            ticket: unit.ticket.name,
            match_date: unit.ticket.match_date,
            venue: unit.venue.name,
            is_used: unit.is_used,
            used_at: unit.used_at,
        }
    }
}

/// Purchase with its units.
#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    /// The purchase
    #[serde(flatten)]
    pub purchase: PurchaseResponse,
    /// Issued units; empty until paid
    pub units: Vec<UnitResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the caller's purchase.
///
/// Someone else's purchase is reported as not found.
///
/// # Errors
///
/// - 401 if `X-Member-Id` is missing
/// - 404 if the purchase does not exist or belongs to another member
pub async fn get_receipt(
    State(state): State<AppState>,
    MemberIdentity(buyer): MemberIdentity,
    Path(purchase_id): Path<Uuid>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let receipt = state
        .reservations
        .purchase(&PurchaseId::from_uuid(purchase_id), &buyer)
        .await?;

    Ok(Json(ReceiptResponse {
        purchase: receipt.purchase.into(),
        units: receipt.units.into_iter().map(UnitResponse::from).collect(),
    }))
}
