//! Outbound email collaborator.

use crate::types::{Purchase, TicketPurchase};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Mail delivery failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Sends buyers their redemption codes.
pub trait Mailer: Send + Sync {
    /// Send every code of a paid purchase to its buyer.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] if the message could not be handed off.
    fn send_redemption_codes<'a>(
        &'a self,
        purchase: &'a Purchase,
        units: &'a [TicketPurchase],
    ) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>>;
}
