//! Gateway client tests against a local stub of the invoice API.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use matchday_core::gateway::{GatewayError, InvoiceRequest, PaymentGateway};
use matchday_testing::CatalogFixture;
use matchday_ticketing::config::GatewayConfig;
use matchday_ticketing::HttpPaymentGateway;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone)]
struct Stub {
    reply: (StatusCode, Value),
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn create_invoice(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    stub.seen.lock().await.push((auth, body));
    (stub.reply.0, Json(stub.reply.1))
}

/// Serve the stub on an ephemeral port and point a client at it.
async fn gateway_with(
    reply: (StatusCode, Value),
) -> (HttpPaymentGateway, Arc<Mutex<Vec<(Option<String>, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v2/invoices", post(create_invoice))
        .with_state(Stub {
            reply,
            seen: seen.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = GatewayConfig {
        base_url: format!("http://{addr}/"),
        secret_key: "sk_test_123".to_string(),
        callback_token: String::new(),
        invoice_duration: 3_600,
        timeout: 5,
        success_redirect_url: Some("https://tickets.example.com/paid".to_string()),
        failure_redirect_url: None,
    };
    let gateway = HttpPaymentGateway::new(&config, Duration::from_secs(5)).unwrap();
    (gateway, seen)
}

fn request(amount: u32) -> InvoiceRequest {
    let catalog = CatalogFixture::build(&[10]);
    let purchase = catalog.pending_purchase(
        amount,
        "TIX-20250601-ABC123-0001",
        Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap(),
    );
    InvoiceRequest::for_purchase(&purchase)
}

#[tokio::test]
async fn test_successful_invoice_maps_to_payment_link() {
    let (gateway, seen) = gateway_with((
        StatusCode::OK,
        json!({
            "id": "inv_579c8d61",
            "invoice_url": "https://checkout.example.com/web/inv_579c8d61",
            "merchant_name": "Liga Tickets",
            "expiry_date": "2025-06-02T02:00:00.000Z",
            "status": "PENDING"
        }),
    ))
    .await;

    let link = gateway.create_payment_link(request(2)).await.unwrap();

    assert_eq!(link.gateway_invoice_id, "inv_579c8d61");
    assert_eq!(link.payment_url, "https://checkout.example.com/web/inv_579c8d61");
    assert_eq!(link.merchant_name, "Liga Tickets");
    assert_eq!(
        link.expires_at,
        Utc.with_ymd_and_hms(2025, 6, 2, 2, 0, 0).unwrap()
    );

    let seen = seen.lock().await;
    assert_eq!(seen.len(), 1);
    let (auth, body) = &seen[0];
    // Secret key as the username, empty password
    assert_eq!(auth.as_deref(), Some("Basic c2tfdGVzdF8xMjM6"));
    assert_eq!(body["external_id"], "TIX-20250601-ABC123-0001");
    assert_eq!(body["currency"], "IDR");
    assert_eq!(body["invoice_duration"], 3_600);
    assert_eq!(body["payer_email"], "dewi@example.com");
    assert_eq!(body["success_redirect_url"], "https://tickets.example.com/paid");
    assert!(body.get("failure_redirect_url").is_none());
    assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_error_status_is_rejected_with_gateway_code() {
    let (gateway, _) = gateway_with((
        StatusCode::BAD_REQUEST,
        json!({
            "error_code": "API_VALIDATION_ERROR",
            "message": "amount must be at least 1000"
        }),
    ))
    .await;

    let err = gateway.create_payment_link(request(1)).await.unwrap_err();

    match err {
        GatewayError::Rejected {
            status,
            error_code,
            message,
        } => {
            assert_eq!(status, 400);
            assert_eq!(error_code, "API_VALIDATION_ERROR");
            assert_eq!(message, "amount must be at least 1000");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unusable_success_body_is_invalid_response() {
    let (gateway, _) = gateway_with((StatusCode::OK, json!({ "unexpected": true }))).await;

    let err = gateway.create_payment_link(request(1)).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unreachable_gateway_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = GatewayConfig {
        base_url: format!("http://{addr}"),
        secret_key: "sk_test_123".to_string(),
        callback_token: String::new(),
        invoice_duration: 3_600,
        timeout: 2,
        success_redirect_url: None,
        failure_redirect_url: None,
    };
    let gateway = HttpPaymentGateway::new(&config, Duration::from_secs(2)).unwrap();

    let err = gateway.create_payment_link(request(1)).await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}
