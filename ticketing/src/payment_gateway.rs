//! HTTP client for the hosted-invoice payment gateway.
//!
//! `POST {base_url}/v2/invoices` with the secret key as the basic-auth
//! username. A 2xx answer carries the invoice id and payment page; anything
//! else carries `{error_code, message}`.

use crate::config::GatewayConfig;
use chrono::{DateTime, Utc};
use matchday_core::gateway::{
    GatewayError, GatewayResult, InvoiceRequest, PaymentGateway, PaymentLink,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Currency every invoice is raised in.
pub const CURRENCY: &str = "IDR";

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    external_id: &'a str,
    amount: u64,
    payer_email: &'a str,
    description: &'a str,
    invoice_duration: u64,
    customer: Customer<'a>,
    items: Vec<Item<'a>>,
    currency: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    success_redirect_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_redirect_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    given_names: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile_number: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Item<'a> {
    name: &'a str,
    quantity: u32,
    price: u64,
    category: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvoiceCreated {
    id: String,
    invoice_url: String,
    #[serde(default)]
    merchant_name: String,
    expiry_date: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

/// Payment gateway client over HTTP.
#[derive(Clone, Debug)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    secret_key: String,
    invoice_duration: u64,
    success_redirect_url: Option<String>,
    failure_redirect_url: Option<String>,
}

impl HttpPaymentGateway {
    /// Build a client from configuration; every call times out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the HTTP client cannot be built
    /// (TLS backend initialisation).
    pub fn new(config: &GatewayConfig, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            invoice_duration: config.invoice_duration,
            success_redirect_url: config.success_redirect_url.clone(),
            failure_redirect_url: config.failure_redirect_url.clone(),
        })
    }

    async fn create_invoice(&self, request: InvoiceRequest) -> GatewayResult<PaymentLink> {
        let body = CreateInvoiceBody {
            external_id: &request.external_id,
            amount: request.amount.rupiah(),
            payer_email: &request.payer.email,
            description: &request.description,
            invoice_duration: self.invoice_duration,
            customer: Customer {
                given_names: &request.payer.name,
                email: &request.payer.email,
                mobile_number: request.payer.phone.as_deref(),
            },
            items: request
                .items
                .iter()
                .map(|item| Item {
                    name: &item.name,
                    quantity: item.quantity,
                    price: item.price.rupiah(),
                    category: &item.category,
                })
                .collect(),
            currency: CURRENCY,
            success_redirect_url: self.success_redirect_url.as_deref(),
            failure_redirect_url: self.failure_redirect_url.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/v2/invoices", self.base_url))
            .basic_auth(&self.secret_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error: ErrorBody = response.json().await.unwrap_or_default();
            tracing::warn!(
                external_id = %request.external_id,
                status = status.as_u16(),
                error_code = %error.error_code,
                "Gateway rejected invoice"
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                error_code: error.error_code,
                message: error.message,
            });
        }

        let created: InvoiceCreated = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::InvalidResponse(e.to_string())
            }
        })?;

        tracing::info!(
            external_id = %request.external_id,
            gateway_invoice_id = %created.id,
            "Payment link created"
        );

        Ok(PaymentLink {
            gateway_invoice_id: created.id,
            payment_url: created.invoice_url,
            merchant_name: created.merchant_name,
            expires_at: created.expiry_date,
        })
    }
}

impl PaymentGateway for HttpPaymentGateway {
    fn create_payment_link(
        &self,
        request: InvoiceRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentLink>> + Send + '_>> {
        Box::pin(self.create_invoice(request))
    }
}
