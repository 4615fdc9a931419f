//! Scripted payment gateway.

use chrono::{DateTime, TimeZone, Utc};
use matchday_core::gateway::{
    GatewayError, GatewayResult, InvoiceRequest, PaymentGateway, PaymentLink,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    requests: Vec<InvoiceRequest>,
    failure: Option<GatewayError>,
    delay: Option<std::time::Duration>,
}

/// Records every invoice request and answers with a deterministic link.
///
/// Invoice ids are `inv_{external_id}`, so a test can build the matching
/// webhook from the purchase alone.
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<Inner>>,
}

impl MockPaymentGateway {
    /// A gateway that accepts every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every following request with `error`.
    pub async fn fail_with(&self, error: GatewayError) {
        self.inner.lock().await.failure = Some(error);
    }

    /// Accept requests again.
    pub async fn recover(&self) {
        self.inner.lock().await.failure = None;
    }

    /// Hold every response for `delay` (for interleaving concurrent checkouts).
    pub async fn delay_responses(&self, delay: std::time::Duration) {
        self.inner.lock().await.delay = Some(delay);
    }

    /// Every request received, in order.
    pub async fn requests(&self) -> Vec<InvoiceRequest> {
        self.inner.lock().await.requests.clone()
    }

    /// The invoice id this gateway assigns to `external_id`.
    #[must_use]
    pub fn invoice_id_for(external_id: &str) -> String {
        format!("inv_{external_id}")
    }

    fn expiry() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 2, 0, 0)
            .single()
            .unwrap_or_default()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_payment_link(
        &self,
        request: InvoiceRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentLink>> + Send + '_>> {
        Box::pin(async move {
            let (failure, delay) = {
                let mut inner = self.inner.lock().await;
                inner.requests.push(request.clone());
                (inner.failure.clone(), inner.delay)
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(error) = failure {
                return Err(error);
            }

            Ok(PaymentLink {
                gateway_invoice_id: Self::invoice_id_for(&request.external_id),
                payment_url: format!("https://pay.example.com/{}", request.external_id),
                merchant_name: "Matchday Tickets".to_string(),
                expires_at: Self::expiry(),
            })
        })
    }
}
