//! Router configuration for the ticketing system.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{checkout, purchases, redemptions, webhooks};
use axum::{
    routing::{get, post},
    Router,
};

/// Build the application router.
///
/// - `/health`, `/ready`
/// - `/api/tickets/:ticket_id/purchases`, `/api/series/:series_id/purchases`
/// - `/api/purchases/:purchase_id`
/// - `/api/webhooks/payments`
/// - `/api/redemptions`, `/api/redemptions/:code`
///
/// Cross-cutting layers (tracing, timeout, correlation id) are added by the
/// caller so tests can exercise the bare routes.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Checkout
        .route("/tickets/:ticket_id/purchases", post(checkout::buy_ticket))
        .route("/series/:series_id/purchases", post(checkout::buy_series))
        .route("/purchases/:purchase_id", get(purchases::get_receipt))
        // Gateway callback (shared-secret authenticated)
        .route("/webhooks/payments", post(webhooks::payment_notification))
        // Gate
        .route("/redemptions", post(redemptions::redeem))
        .route("/redemptions/:code", get(redemptions::lookup));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .with_state(state)
}
