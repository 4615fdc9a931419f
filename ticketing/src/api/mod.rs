//! API endpoints for the ticketing system.
//!
//! Handlers stay thin: extract input, call a service, map the result.
//! - Checkout: single-day and series purchases
//! - Purchases: buyer receipts
//! - Webhooks: payment gateway settlement callbacks
//! - Redemptions: gate pre-scan and admission

pub mod checkout;
pub mod purchases;
pub mod redemptions;
pub mod webhooks;

pub use checkout::{buy_series, buy_ticket};
pub use purchases::get_receipt;
pub use redemptions::{lookup, redeem};
pub use webhooks::payment_notification;
