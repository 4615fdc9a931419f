//! Application state for the ticketing HTTP server.
//!
//! Contains the shared resources HTTP handlers need:
//! - The three workflow services
//! - The shared secret the payment gateway signs its webhooks with
//! - A readiness probe for the database

use super::health::ReadinessProbe;
use crate::app::{RedemptionService, ReservationService, SettlementService};
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Checkout and receipts
    pub reservations: Arc<ReservationService>,

    /// Payment webhook
    pub settlements: Arc<SettlementService>,

    /// Gate scans
    pub redemptions: Arc<RedemptionService>,

    /// Expected `X-Callback-Token` value
    pub callback_token: Arc<str>,

    /// Database connectivity check for `/ready`
    pub readiness: Arc<dyn ReadinessProbe>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        reservations: Arc<ReservationService>,
        settlements: Arc<SettlementService>,
        redemptions: Arc<RedemptionService>,
        callback_token: &str,
        readiness: Arc<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            reservations,
            settlements,
            redemptions,
            callback_token: Arc::from(callback_token),
            readiness,
        }
    }
}
