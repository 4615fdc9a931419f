//! Default mailer: logs the message instead of delivering it.
//!
//! Email delivery belongs to the surrounding application; deployments
//! without one still get the codes in the logs.

use matchday_core::mailer::{MailError, Mailer};
use matchday_core::types::{Purchase, TicketPurchase};
use std::future::Future;
use std::pin::Pin;

/// Mailer that writes each message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_redemption_codes<'a>(
        &'a self,
        purchase: &'a Purchase,
        units: &'a [TicketPurchase],
    ) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>> {
        Box::pin(async move {
            for unit in units {
                tracing::info!(
                    purchase_id = %purchase.id,
                    to = %purchase.buyer.email,
                    ticket = %unit.ticket.name,
                    match_date = %unit.ticket.match_date,
                    code = %unit.code,
                    "Redemption code"
                );
            }
            Ok(())
        })
    }
}
