//! Mailer that records instead of sending.

use matchday_core::mailer::{MailError, Mailer};
use matchday_core::types::{Purchase, PurchaseId, TicketPurchase};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    /// Purchase the codes belong to
    pub purchase_id: PurchaseId,
    /// Recipient
    pub to: String,
    /// Codes in the message
    pub codes: Vec<String>,
}

#[derive(Default)]
struct Inner {
    sent: Vec<SentMail>,
    failures_left: u32,
}

/// Records every message; can be told to fail a number of times first.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingMailer {
    /// A mailer that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` sends.
    pub async fn fail_next(&self, times: u32) {
        self.inner.lock().await.failures_left = times;
    }

    /// Messages sent so far.
    pub async fn sent(&self) -> Vec<SentMail> {
        self.inner.lock().await.sent.clone()
    }
}

impl Mailer for RecordingMailer {
    fn send_redemption_codes<'a>(
        &'a self,
        purchase: &'a Purchase,
        units: &'a [TicketPurchase],
    ) -> Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().await;
            if inner.failures_left > 0 {
                inner.failures_left -= 1;
                return Err(MailError("smtp unavailable".to_string()));
            }

            inner.sent.push(SentMail {
                purchase_id: purchase.id,
                to: purchase.buyer.email.clone(),
                codes: units.iter().map(|u| u.code.clone()).collect(),
            });
            Ok(())
        })
    }
}
