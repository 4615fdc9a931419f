//! Gate redemption tests.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use chrono::NaiveDate;
use common::{notification, Harness};
use matchday_core::environment::Clock;
use matchday_core::types::{Product, TicketPurchase};
use matchday_core::TicketingError;
use matchday_testing::wib_clock;

/// Buy and pay for `amount` of every fixture ticket, returning the units.
async fn paid_units(h: &Harness, amount: u32) -> Vec<TicketPurchase> {
    let product = if h.catalog.tickets.len() == 1 {
        Product::Ticket(h.catalog.tickets[0].id)
    } else {
        Product::Series(h.catalog.series.id)
    };
    let purchase = h
        .reservations
        .reserve(&h.catalog.member.id, product, amount)
        .await
        .expect("checkout succeeds");
    h.settlements
        .handle_notification(notification(&purchase, "PAID"))
        .await
        .expect("payment settles");
    h.store.units().await
}

#[tokio::test]
async fn test_redeem_on_match_day() {
    let h = Harness::new(&[10]).await;
    let unit = paid_units(&h, 1).await.remove(0);

    let redeemed = h.redemptions.redeem(&unit.code).await.unwrap();

    assert!(redeemed.is_used);
    assert_eq!(redeemed.used_at, Some(h.clock.now()));
    let stored = h.store.units().await.remove(0);
    assert!(stored.is_used);
    assert_eq!(stored.used_at, Some(h.clock.now()));
}

#[tokio::test]
async fn test_redeem_ignores_surrounding_whitespace() {
    let h = Harness::new(&[10]).await;
    let unit = paid_units(&h, 1).await.remove(0);

    let redeemed = h
        .redemptions
        .redeem(&format!("  {}\n", unit.code))
        .await
        .unwrap();
    assert_eq!(redeemed.id, unit.id);
}

#[tokio::test]
async fn test_redeem_on_another_day_is_refused() {
    let h = Harness::new(&[10, 10]).await;
    let units = paid_units(&h, 1).await;
    let second_day = units
        .iter()
        .find(|u| u.ticket.ticket_id == h.catalog.tickets[1].id)
        .unwrap();

    let err = h.redemptions.redeem(&second_day.code).await.unwrap_err();

    match err {
        TicketingError::WrongDay { scheduled, today } => {
            assert_eq!(scheduled, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
            assert_eq!(today, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        }
        other => panic!("expected WrongDay, got {other:?}"),
    }
    assert!(h.store.units().await.iter().all(|u| !u.is_used));
}

#[tokio::test]
async fn test_match_day_follows_jakarta_midnight() {
    let h = Harness::new(&[10, 10]).await;
    let units = paid_units(&h, 1).await;
    let second_day = units
        .iter()
        .find(|u| u.ticket.ticket_id == h.catalog.tickets[1].id)
        .unwrap()
        .clone();

    // 23:59 WIB on the first; still the wrong day
    h.clock.set(wib_clock(2025, 6, 1, 23, 59).now());
    assert!(matches!(
        h.redemptions.redeem(&second_day.code).await,
        Err(TicketingError::WrongDay { .. })
    ));

    // 00:05 WIB on the second is 17:05 UTC on the first
    h.clock.set(wib_clock(2025, 6, 2, 0, 5).now());
    let redeemed = h.redemptions.redeem(&second_day.code).await.unwrap();
    assert!(redeemed.is_used);
}

#[tokio::test]
async fn test_second_redemption_is_a_conflict() {
    let h = Harness::new(&[10]).await;
    let unit = paid_units(&h, 1).await.remove(0);

    let first = h.redemptions.redeem(&unit.code).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(10));
    let err = h.redemptions.redeem(&unit.code).await.unwrap_err();

    assert!(matches!(err, TicketingError::StateConflict(_)));
    assert_eq!(h.store.units().await[0].used_at, first.used_at);
}

#[tokio::test]
async fn test_used_code_on_wrong_day_reports_wrong_day() {
    let h = Harness::new(&[10]).await;
    let unit = paid_units(&h, 1).await.remove(0);
    h.redemptions.redeem(&unit.code).await.unwrap();

    h.clock.set(wib_clock(2025, 6, 3, 10, 0).now());
    let err = h.redemptions.redeem(&unit.code).await.unwrap_err();
    assert!(matches!(err, TicketingError::WrongDay { .. }));
}

#[tokio::test]
async fn test_concurrent_redemptions_admit_once() {
    let h = Harness::new(&[10]).await;
    let unit = paid_units(&h, 1).await.remove(0);

    let (a, b) = tokio::join!(
        h.redemptions.redeem(&unit.code),
        h.redemptions.redeem(&unit.code)
    );

    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(TicketingError::StateConflict(_))));
}

#[tokio::test]
async fn test_blank_and_unknown_codes() {
    let h = Harness::new(&[10]).await;

    assert!(matches!(
        h.redemptions.redeem("   ").await,
        Err(TicketingError::Validation { field: "code", .. })
    ));
    assert!(matches!(
        h.redemptions.redeem("NOPE-0000").await,
        Err(TicketingError::NotFound { resource: "code", .. })
    ));
    assert!(matches!(
        h.redemptions.lookup("").await,
        Err(TicketingError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_lookup_does_not_use_the_code() {
    let h = Harness::new(&[10]).await;
    let unit = paid_units(&h, 1).await.remove(0);

    let found = h.redemptions.lookup(&unit.code).await.unwrap();
    assert_eq!(found.id, unit.id);
    assert!(!found.is_used);

    // Still redeemable afterwards
    assert!(h.redemptions.redeem(&unit.code).await.is_ok());
}
