//! Business metrics for matchday ticket sales.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `matchday_purchases_total{status}` - Checkouts by result (created, free, rejected, failed)
//! - `matchday_quota_rejections_total` - Checkouts refused for lack of stock
//! - `matchday_settlements_total{outcome}` - Webhook outcomes (paid, failed, duplicate)
//! - `matchday_units_issued_total` - Redeemable units created
//! - `matchday_redemptions_total{outcome}` - Gate scans (redeemed, wrong_day, already_used, unknown_code)
//! - `matchday_credit_back_total{result}` - Synchronous credit-backs (applied, deferred)
//!
//! ## Histograms
//! - `matchday_checkout_duration_seconds` - Time spent in `reserve`
//!
//! Outbox dispatch metrics are recorded by `matchday-runtime`.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use std::time::Duration;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "matchday_purchases_total",
        "Checkouts by result (created, free, rejected, failed)"
    );
    describe_counter!(
        "matchday_quota_rejections_total",
        "Checkouts refused because a ticket did not have enough remaining stock"
    );
    describe_histogram!(
        "matchday_checkout_duration_seconds",
        "Time taken by a checkout, including the payment gateway call"
    );
    describe_counter!(
        "matchday_settlements_total",
        "Payment notifications by outcome (paid, failed, duplicate)"
    );
    describe_counter!(
        "matchday_units_issued_total",
        "Redeemable units issued on payment"
    );
    describe_counter!(
        "matchday_redemptions_total",
        "Redemption attempts by outcome (redeemed, wrong_day, already_used, unknown_code)"
    );
    describe_counter!(
        "matchday_credit_back_total",
        "Inventory credit-backs after a failed checkout (applied, deferred)"
    );

    describe_gauge!(
        "matchday_outbox_dead_letters",
        "Outbox entries given up on, as counted at startup"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a checkout result.
pub fn record_checkout(status: &'static str, duration: Duration) {
    metrics::counter!("matchday_purchases_total", "status" => status).increment(1);
    metrics::histogram!("matchday_checkout_duration_seconds").record(duration.as_secs_f64());
}

/// Record how many outbox entries are dead-lettered.
#[allow(clippy::cast_precision_loss)]
pub fn record_dead_letters(count: u64) {
    metrics::gauge!("matchday_outbox_dead_letters").set(count as f64);
}

/// Record a checkout refused for lack of stock.
pub fn record_quota_rejection() {
    metrics::counter!("matchday_quota_rejections_total").increment(1);
}

/// Record a synchronous credit-back, applied or deferred to the outbox.
pub fn record_credit_back(result: &'static str) {
    metrics::counter!("matchday_credit_back_total", "result" => result).increment(1);
}

/// Record a settlement outcome.
pub fn record_settlement(outcome: &'static str, units_issued: usize) {
    metrics::counter!("matchday_settlements_total", "outcome" => outcome).increment(1);
    if units_issued > 0 {
        metrics::counter!("matchday_units_issued_total").increment(units_issued as u64);
    }
}

/// Record a redemption attempt.
pub fn record_redemption(outcome: &'static str) {
    metrics::counter!("matchday_redemptions_total", "outcome" => outcome).increment(1);
}
