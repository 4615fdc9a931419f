//! Payment gateway abstraction.
//!
//! The gateway is an opaque external service: we ask it for a hosted payment
//! link keyed by our own `external_id`, and it later reports the outcome through
//! a webhook (see [`crate::settlement`]).

use crate::types::{BuyerSnapshot, Money, Purchase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors from the payment gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway answered with a non-2xx status.
    #[error("gateway rejected the invoice ({status} {error_code}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Gateway error code
        error_code: String,
        /// Gateway message
        message: String,
    },

    /// The request never got a response.
    #[error("gateway unreachable: {0}")]
    Transport(String),

    /// The request timed out.
    #[error("gateway timeout")]
    Timeout,

    /// The gateway answered 2xx with a body we could not use.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

/// One invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// Line description
    pub name: String,
    /// Units
    pub quantity: u32,
    /// Unit price
    pub price: Money,
    /// Item category shown on the payment page
    pub category: String,
}

/// Everything the gateway needs to open an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    /// Our correlation id
    pub external_id: String,
    /// Amount to collect
    pub amount: Money,
    /// Human-readable description
    pub description: String,
    /// Who pays
    pub payer: BuyerSnapshot,
    /// Invoice lines
    pub items: Vec<InvoiceItem>,
}

impl InvoiceRequest {
    /// Build the invoice request for a pending purchase.
    ///
    /// A single-day purchase has one line; a series package has one line
    /// priced at the package price.
    #[must_use]
    pub fn for_purchase(purchase: &Purchase) -> Self {
        let name = match purchase.tickets.as_slice() {
            [ticket] => format!("{} - {}", purchase.series.name, ticket.name),
            _ => format!("{} (season package)", purchase.series.name),
        };

        Self {
            external_id: purchase.invoice.external_id.clone(),
            amount: purchase.grand_total,
            description: format!("{} x {} - {}", purchase.amount, name, purchase.season.name),
            payer: purchase.buyer.clone(),
            items: vec![InvoiceItem {
                name,
                quantity: purchase.amount,
                price: purchase.price,
                category: "Ticket".to_string(),
            }],
        }
    }
}

/// A hosted payment link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    /// Invoice id assigned by the gateway
    pub gateway_invoice_id: String,
    /// Hosted payment page
    pub payment_url: String,
    /// Merchant name shown by the gateway
    pub merchant_name: String,
    /// When the link stops accepting payment
    pub expires_at: DateTime<Utc>,
}

/// Payment gateway trait
///
/// Uses an explicit boxed future so implementations can be shared as
/// `Arc<dyn PaymentGateway>`.
pub trait PaymentGateway: Send + Sync {
    /// Open an invoice and return its payment link.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the gateway refuses the invoice or cannot
    /// be reached.
    fn create_payment_link(
        &self,
        request: InvoiceRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentLink>> + Send + '_>>;
}
