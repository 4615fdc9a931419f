//! Checkout tests.
//!
//! Run with: `cargo test --test reservation_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

mod common;

use common::Harness;
use matchday_core::environment::Clock;
use matchday_core::gateway::GatewayError;
use matchday_core::intent::Intent;
use matchday_core::store::InventoryLedger;
use matchday_core::types::{MemberId, Money, Product, PurchaseStatus, SeriesId, TicketId};
use matchday_core::TicketingError;
use matchday_testing::fixtures::{PACKAGE_PRICE, TICKET_PRICE};
use matchday_testing::{wib_clock, Fault};
use std::time::Duration;

#[tokio::test]
async fn test_single_day_checkout_creates_pending_purchase_with_link() {
    let h = Harness::new(&[10]).await;
    let ticket = h.catalog.tickets[0].clone();

    let purchase = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket.id), 2)
        .await
        .expect("checkout succeeds");

    assert_eq!(purchase.status, PurchaseStatus::Pending);
    assert_eq!(purchase.amount, 2);
    assert_eq!(purchase.price, TICKET_PRICE);
    assert_eq!(purchase.grand_total, Money::from_rupiah(150_000));
    assert_eq!(purchase.invoice.external_id, "TIX-20250601-SFX001-0001");
    assert_eq!(
        purchase.invoice.gateway_invoice_id.as_deref(),
        Some("inv_TIX-20250601-SFX001-0001")
    );
    assert!(purchase.invoice.payment_url.is_some());
    assert!(purchase.expires_at.is_some());
    assert_eq!(purchase.buyer.email, "dewi@example.com");
    assert_eq!(purchase.tickets.len(), 1);
    assert_eq!(purchase.tickets[0].venue.name, "Gelora Bung Karno");

    assert_eq!(h.remaining(0).await, 8);
    assert_eq!(h.store.purchases().await, vec![purchase.clone()]);

    let requests = h.gateway.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, Money::from_rupiah(150_000));
    assert_eq!(requests[0].external_id, purchase.invoice.external_id);
}

#[tokio::test]
async fn test_external_id_sequence_counts_the_wib_day() {
    let h = Harness::new(&[10]).await;
    let ticket = h.catalog.tickets[0].id;

    let first = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket), 1)
        .await
        .unwrap();
    let second = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket), 1)
        .await
        .unwrap();

    assert_eq!(first.invoice.external_id, "TIX-20250601-SFX001-0001");
    assert_eq!(second.invoice.external_id, "TIX-20250601-SFX002-0002");

    // 00:30 WIB on 2025-06-02 is still 2025-06-01 in UTC
    h.clock.set(wib_clock(2025, 6, 2, 0, 30).now());
    let next_day = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket), 1)
        .await
        .unwrap();
    assert_eq!(next_day.invoice.external_id, "TIX-20250602-SFX003-0001");
}

#[tokio::test]
async fn test_series_checkout_debits_every_ticket_at_package_price() {
    let h = Harness::new(&[10, 10, 10]).await;

    let purchase = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Series(h.catalog.series.id), 2)
        .await
        .unwrap();

    assert_eq!(purchase.tickets.len(), 3);
    assert_eq!(purchase.price, PACKAGE_PRICE);
    assert_eq!(purchase.grand_total, Money::from_rupiah(400_000));
    assert_eq!(purchase.expected_units(), 6);
    for index in 0..3 {
        assert_eq!(h.remaining(index).await, 8);
    }

    let requests = h.gateway.requests().await;
    assert_eq!(requests[0].items.len(), 1);
    assert_eq!(requests[0].items[0].quantity, 2);
}

#[tokio::test]
async fn test_amount_outside_limits_is_a_validation_error() {
    let h = Harness::new(&[10]).await;
    let product = Product::Ticket(h.catalog.tickets[0].id);

    for amount in [0, 5] {
        let err = h
            .reservations
            .reserve(&h.catalog.member.id, product, amount)
            .await
            .unwrap_err();
        assert!(
            matches!(err, TicketingError::Validation { field: "amount", .. }),
            "amount {amount}: {err:?}"
        );
    }

    assert_eq!(h.remaining(0).await, 10);
    assert!(h.gateway.requests().await.is_empty());
}

#[tokio::test]
async fn test_unknown_product_and_buyer_are_not_found() {
    let h = Harness::new(&[10]).await;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(TicketId::new()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketingError::NotFound { resource: "ticket", .. }));

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Series(SeriesId::new()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketingError::NotFound { resource: "series", .. }));

    let err = h
        .reservations
        .reserve(&MemberId::new(), Product::Ticket(h.catalog.tickets[0].id), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketingError::NotFound { resource: "member", .. }));

    // Nothing was debited on the way
    assert_eq!(h.remaining(0).await, 10);
}

#[tokio::test]
async fn test_empty_series_is_a_validation_error() {
    let h = Harness::new(&[]).await;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Series(h.catalog.series.id), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, TicketingError::Validation { field: "series_id", .. }));
}

#[tokio::test]
async fn test_insufficient_remaining_is_a_quota_error() {
    let h = Harness::new(&[3]).await;
    let ticket = h.catalog.tickets[0].id;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket), 4)
        .await
        .unwrap_err();

    match err {
        TicketingError::Quota {
            ticket_id,
            requested,
            remaining,
        } => {
            assert_eq!(ticket_id, ticket);
            assert_eq!(requested, 4);
            assert_eq!(remaining, 3);
        }
        other => panic!("expected Quota, got {other:?}"),
    }
    assert_eq!(h.remaining(0).await, 3);
    assert!(h.store.purchases().await.is_empty());
}

#[tokio::test]
async fn test_series_with_one_short_ticket_debits_nothing() {
    let h = Harness::new(&[10, 1, 10]).await;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Series(h.catalog.series.id), 2)
        .await
        .unwrap_err();

    assert!(matches!(err, TicketingError::Quota { remaining: 1, .. }));
    assert_eq!(h.remaining(0).await, 10);
    assert_eq!(h.remaining(1).await, 1);
    assert_eq!(h.remaining(2).await, 10);
}

/// The check-then-act race: `stock = 10, used = 7`, `reserve(3)` and a
/// concurrent `reserve(1)`. Only one of them may get the last units.
#[tokio::test]
async fn test_last_units_cannot_be_sold_twice() {
    let h = Harness::new(&[10]).await;
    let ticket = h.catalog.tickets[0].id;
    h.store.debit(&ticket, 7).await.unwrap();
    // Hold the first checkout inside the gateway call after it has debited
    h.gateway.delay_responses(Duration::from_millis(50)).await;

    let buyer = h.catalog.member.id;
    let (three, one) = tokio::join!(
        h.reservations.reserve(&buyer, Product::Ticket(ticket), 3),
        h.reservations.reserve(&buyer, Product::Ticket(ticket), 1),
    );

    assert!(three.is_ok(), "reserve(3) should win: {three:?}");
    assert!(
        matches!(one, Err(TicketingError::Quota { remaining: 0, .. })),
        "reserve(1) should be refused: {one:?}"
    );
    assert_eq!(h.store.quota(&ticket).await.unwrap().used, 10);
    assert_eq!(h.store.purchases().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let h = Harness::new(&[10]).await;
    let ticket = h.catalog.tickets[0].id;
    let buyer = h.catalog.member.id;

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let reservations = h.reservations.clone();
            tokio::spawn(async move {
                reservations
                    .reserve(&buyer, Product::Ticket(ticket), 1)
                    .await
            })
        })
        .collect();

    let mut sold = 0;
    let mut refused = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => sold += 1,
            Err(TicketingError::Quota { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(sold, 10);
    assert_eq!(refused, 15);
    assert_eq!(h.remaining(0).await, 0);
    assert_eq!(h.store.purchases().await.len(), 10);
}

#[tokio::test]
async fn test_gateway_rejection_persists_nothing_and_restores_quota() {
    let h = Harness::new(&[10, 10]).await;
    h.gateway
        .fail_with(GatewayError::Rejected {
            status: 400,
            error_code: "API_VALIDATION_ERROR".to_string(),
            message: "payer_email is invalid".to_string(),
        })
        .await;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Series(h.catalog.series.id), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, TicketingError::Gateway(GatewayError::Rejected { .. })));
    assert!(h.store.purchases().await.is_empty());
    assert_eq!(h.remaining(0).await, 10);
    assert_eq!(h.remaining(1).await, 10);
    assert_eq!(h.store.credits().await.len(), 2);
}

#[tokio::test]
async fn test_insert_failure_restores_quota() {
    let h = Harness::new(&[10]).await;
    h.store.inject(Fault::InsertPurchase).await;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(h.catalog.tickets[0].id), 2)
        .await
        .unwrap_err();

    assert!(matches!(err, TicketingError::Persistence(_)));
    assert!(err.is_retryable());
    assert_eq!(h.remaining(0).await, 10);
}

#[tokio::test]
async fn test_failed_credit_back_is_deferred_to_the_outbox() {
    let h = Harness::new(&[10]).await;
    let ticket = h.catalog.tickets[0].id;
    h.gateway.fail_with(GatewayError::Timeout).await;
    h.store.inject(Fault::Credit).await;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketingError::Gateway(GatewayError::Timeout)));
    assert_eq!(h.remaining(0).await, 8);

    let outbox = h.store.outbox().await;
    assert_eq!(outbox.len(), 1);
    assert!(matches!(
        outbox[0].entry.intent,
        Intent::CreditInventory { ticket_id, amount: 2, .. } if ticket_id == ticket
    ));

    // Once storage recovers the worker gives the units back
    h.store.heal(Fault::Credit).await;
    let report = h.worker.drain_once().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(h.remaining(0).await, 10);
}

/// Put a zero-priced ticket in the fixture series.
async fn free_ticket(h: &Harness, stock: u32) -> TicketId {
    let mut ticket = matchday_testing::CatalogFixture::build(&[stock]).tickets.remove(0);
    ticket.series_id = h.catalog.series.id;
    ticket.venue_id = h.catalog.venue.id;
    ticket.price = Money::ZERO;
    h.store.put_ticket(ticket.clone()).await;
    ticket.id
}

#[tokio::test]
async fn test_free_ticket_is_paid_without_the_gateway() {
    let h = Harness::new(&[]).await;
    let ticket = free_ticket(&h, 5).await;

    let purchase = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket), 2)
        .await
        .unwrap();

    assert_eq!(purchase.status, PurchaseStatus::Paid);
    assert_eq!(purchase.paid_at, Some(h.clock.now()));
    assert!(purchase.grand_total.is_zero());
    assert!(purchase.invoice.gateway_invoice_id.is_none());
    assert!(purchase.invoice.payment_url.is_none());
    assert!(h.gateway.requests().await.is_empty());
    assert_eq!(h.store.quota(&ticket).await.unwrap().remaining(), 3);

    assert_eq!(h.store.purchases().await, vec![purchase.clone()]);
    let units = h.store.units().await;
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|u| u.purchase_id == purchase.id));

    // Codes go out through the outbox like any paid purchase
    assert_eq!(h.worker.drain_once().await.unwrap().completed, 1);
    assert_eq!(h.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn test_free_ticket_that_cannot_settle_is_failed_and_credited() {
    let h = Harness::new(&[]).await;
    let ticket = free_ticket(&h, 5).await;
    h.store.inject(Fault::CommitPaid).await;

    let err = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(ticket), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketingError::Persistence(_)));

    // Failed rather than left pending, so the hold is released
    let purchases = h.store.purchases().await;
    assert_eq!(purchases[0].status, PurchaseStatus::Failed);
    assert!(h.store.units().await.is_empty());
    assert_eq!(h.store.quota(&ticket).await.unwrap().remaining(), 3);

    assert_eq!(h.worker.drain_once().await.unwrap().completed, 1);
    assert_eq!(h.store.quota(&ticket).await.unwrap().remaining(), 5);
}

#[tokio::test]
async fn test_abandoned_request_still_finishes_the_checkout() {
    let h = Harness::new(&[10]).await;
    h.gateway.delay_responses(Duration::from_millis(300)).await;

    let waited = tokio::time::timeout(
        Duration::from_millis(50),
        h.reservations
            .reserve(&h.catalog.member.id, Product::Ticket(h.catalog.tickets[0].id), 4),
    )
    .await;
    assert!(waited.is_err(), "caller gives up before the gateway answers");

    // The checkout task outlives the caller and stores the purchase
    let mut purchases = Vec::new();
    for _ in 0..100 {
        purchases = h.store.purchases().await;
        if !purchases.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].status, PurchaseStatus::Pending);
    assert!(purchases[0].invoice.payment_url.is_some());
    assert_eq!(h.remaining(0).await, 6);
}

#[tokio::test]
async fn test_abandoned_request_with_failing_gateway_restores_quota() {
    let h = Harness::new(&[10]).await;
    h.gateway.delay_responses(Duration::from_millis(300)).await;
    h.gateway.fail_with(GatewayError::Timeout).await;

    let waited = tokio::time::timeout(
        Duration::from_millis(50),
        h.reservations
            .reserve(&h.catalog.member.id, Product::Ticket(h.catalog.tickets[0].id), 4),
    )
    .await;
    assert!(waited.is_err());
    assert_eq!(h.remaining(0).await, 6);

    let mut remaining = 0;
    for _ in 0..100 {
        remaining = h.remaining(0).await;
        if remaining == 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 10);
    assert!(h.store.purchases().await.is_empty());
    assert!(h.store.outbox().await.is_empty());
}

#[tokio::test]
async fn test_receipt_is_visible_to_its_buyer_only() {
    let h = Harness::new(&[10]).await;
    let purchase = h
        .reservations
        .reserve(&h.catalog.member.id, Product::Ticket(h.catalog.tickets[0].id), 1)
        .await
        .unwrap();

    let receipt = h
        .reservations
        .purchase(&purchase.id, &h.catalog.member.id)
        .await
        .unwrap();
    assert_eq!(receipt.purchase, purchase);
    assert!(receipt.units.is_empty());

    let err = h
        .reservations
        .purchase(&purchase.id, &MemberId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TicketingError::NotFound { resource: "purchase", .. }));
}
