//! Settlement state machine.
//!
//! A purchase leaves `Pending` exactly once, driven by the payment gateway's
//! webhook:
//!
//! ```text
//! Pending ──PAID/SETTLED──▶ Paid    (units issued, codes emailed)
//!    │
//!    └──────anything else──▶ Failed  (inventory credited back)
//! ```
//!
//! [`SettlementReducer`] is pure: it mutates the purchase in memory and
//! returns the units and intents the caller must commit atomically with it.

use crate::environment::{Clock, CodeGenerator};
use crate::error::TicketingError;
use crate::intent::Intent;
use crate::reducer::Reducer;
use crate::types::{Purchase, PurchaseStatus, TicketPurchase, TicketPurchaseId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// Gateway statuses that mean the money arrived.
const PAID_STATUSES: [&str; 2] = ["PAID", "SETTLED"];

// ============================================================================
// Input
// ============================================================================

/// Payment notification delivered by the gateway's webhook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// Invoice id assigned by the gateway
    pub id: String,
    /// Our correlation id
    pub external_id: String,
    /// Gateway status (`PAID`, `SETTLED`, `EXPIRED`, ...)
    pub status: String,
    /// When the payment was made
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    /// Payment method
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Bank code
    #[serde(default)]
    pub bank_code: Option<String>,
    /// Payment channel
    #[serde(default)]
    pub payment_channel: Option<String>,
    /// Payment destination
    #[serde(default)]
    pub payment_destination: Option<String>,
    /// Merchant name
    #[serde(default)]
    pub merchant_name: Option<String>,
}

impl PaymentNotification {
    /// Whether the gateway reports the invoice as paid (case-insensitive).
    #[must_use]
    pub fn is_paid(&self) -> bool {
        PAID_STATUSES
            .iter()
            .any(|paid| self.status.trim().eq_ignore_ascii_case(paid))
    }
}

/// Final invoice details reported with a successful payment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentDetails {
    /// Payment method
    pub payment_method: Option<String>,
    /// Bank code
    pub bank_code: Option<String>,
    /// Payment channel
    pub payment_channel: Option<String>,
    /// Payment destination
    pub payment_destination: Option<String>,
    /// Merchant name
    pub merchant_name: Option<String>,
}

/// Settlement action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementAction {
    /// The gateway collected the money.
    MarkPaid {
        /// When the gateway says it was paid; defaults to now
        paid_at: Option<DateTime<Utc>>,
        /// Final invoice fields
        details: PaymentDetails,
    },

    /// The invoice expired or failed.
    MarkFailed {
        /// Raw gateway status, for logs
        status: String,
    },
}

impl From<PaymentNotification> for SettlementAction {
    fn from(notification: PaymentNotification) -> Self {
        if notification.is_paid() {
            Self::MarkPaid {
                paid_at: notification.paid_at,
                details: PaymentDetails {
                    payment_method: notification.payment_method,
                    bank_code: notification.bank_code,
                    payment_channel: notification.payment_channel,
                    payment_destination: notification.payment_destination,
                    merchant_name: notification.merchant_name,
                },
            }
        } else {
            Self::MarkFailed {
                status: notification.status,
            }
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Work produced by a settlement transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementEffect {
    /// Insert these redeemable units.
    IssueUnits(Vec<TicketPurchase>),
    /// Record this intent in the outbox.
    Enqueue(Intent),
}

/// What a committed notification did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// Purchase is now paid.
    Paid {
        /// Units issued
        units_issued: usize,
    },
    /// Purchase is now failed.
    Failed {
        /// Ticket lines queued for credit-back
        credits_queued: usize,
    },
}

impl SettlementOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paid { .. } => "paid",
            Self::Failed { .. } => "failed",
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Injected dependencies for settlement.
#[derive(Clone)]
pub struct SettlementEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Redemption code source
    pub codes: Arc<dyn CodeGenerator>,
}

impl SettlementEnvironment {
    /// Creates a new `SettlementEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, codes: Arc<dyn CodeGenerator>) -> Self {
        Self { clock, codes }
    }
}

/// Pure `Pending → {Paid, Failed}` transition.
#[derive(Clone, Debug, Default)]
pub struct SettlementReducer;

impl SettlementReducer {
    /// Creates a new `SettlementReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// One unit per admission: `amount` units for every ticket line.
    fn issue_units(
        purchase: &Purchase,
        now: DateTime<Utc>,
        codes: &dyn CodeGenerator,
    ) -> Vec<TicketPurchase> {
        let mut units = Vec::with_capacity(purchase.expected_units());
        let mut seen = std::collections::HashSet::with_capacity(purchase.expected_units());

        for ticket in &purchase.tickets {
            for _ in 0..purchase.amount {
                // Codes must be distinct within the batch; uniqueness across
                // batches is enforced by storage.
                let mut code = codes.redemption_code();
                while !seen.insert(code.clone()) {
                    code = codes.redemption_code();
                }

                units.push(TicketPurchase {
                    id: TicketPurchaseId::new(),
                    purchase_id: purchase.id,
                    buyer: purchase.buyer.clone(),
                    ticket: ticket.clone(),
                    venue: ticket.venue.clone(),
                    code,
                    is_used: false,
                    used_at: None,
                    created_at: now,
                });
            }
        }

        units
    }
}

impl Reducer for SettlementReducer {
    type State = Purchase;
    type Action = SettlementAction;
    type Environment = SettlementEnvironment;
    type Effect = SettlementEffect;
    type Error = TicketingError;

    fn reduce(
        &self,
        purchase: &mut Purchase,
        action: SettlementAction,
        env: &SettlementEnvironment,
    ) -> Result<SmallVec<[SettlementEffect; 4]>, TicketingError> {
        if purchase.status.is_terminal() {
            return Err(TicketingError::conflict(format!(
                "purchase {} is already {}",
                purchase.id, purchase.status
            )));
        }

        let now = env.clock.now();

        match action {
            SettlementAction::MarkPaid { paid_at, details } => {
                let units = Self::issue_units(purchase, now, env.codes.as_ref());

                purchase.status = PurchaseStatus::Paid;
                purchase.paid_at = Some(paid_at.unwrap_or(now));
                let invoice = &mut purchase.invoice;
                invoice.payment_method = details.payment_method;
                invoice.bank_code = details.bank_code;
                invoice.payment_channel = details.payment_channel;
                invoice.payment_destination = details.payment_destination;
                if details.merchant_name.is_some() {
                    invoice.merchant_name = details.merchant_name;
                }

                Ok(smallvec![
                    SettlementEffect::IssueUnits(units),
                    SettlementEffect::Enqueue(Intent::EmailRedemptionCodes {
                        purchase_id: purchase.id,
                    }),
                ])
            }

            SettlementAction::MarkFailed { .. } => {
                purchase.status = PurchaseStatus::Failed;

                Ok(purchase
                    .tickets
                    .iter()
                    .map(|ticket| {
                        SettlementEffect::Enqueue(Intent::CreditInventory {
                            purchase_id: purchase.id,
                            ticket_id: ticket.ticket_id,
                            amount: purchase.amount,
                        })
                    })
                    .collect())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::environment::SystemClock;
    use crate::types::{
        BuyerSnapshot, Invoice, MemberId, Money, PurchaseId, SeasonId, SeasonSnapshot, SeriesId,
        SeriesSnapshot, TicketId, TicketSnapshot, VenueId, VenueSnapshot,
    };
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Hands out `CODE0001`, `CODE0002`, ... and repeats the first code once.
    #[derive(Default)]
    struct StutteringCodes(AtomicU32);

    impl CodeGenerator for StutteringCodes {
        fn redemption_code(&self) -> String {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            format!("CODE{:04}", if n == 1 { 0 } else { n })
        }

        fn invoice_suffix(&self) -> String {
            "AAAAAA".to_string()
        }
    }

    fn env() -> SettlementEnvironment {
        SettlementEnvironment::new(Arc::new(SystemClock), Arc::new(StutteringCodes::default()))
    }

    fn line(day: u32) -> TicketSnapshot {
        TicketSnapshot {
            ticket_id: TicketId::new(),
            name: format!("Matchday {day}"),
            match_date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            price: Money::from_rupiah(50_000),
            venue: VenueSnapshot {
                venue_id: VenueId::new(),
                name: "Gelora".to_string(),
                city: "Jakarta".to_string(),
            },
            matches: vec![],
        }
    }

    fn pending(lines: usize, amount: u32) -> Purchase {
        Purchase {
            id: PurchaseId::new(),
            buyer: BuyerSnapshot {
                member_id: MemberId::new(),
                name: "Sari".to_string(),
                email: "sari@example.com".to_string(),
                phone: None,
            },
            season: SeasonSnapshot {
                season_id: SeasonId::new(),
                name: "Liga 2025".to_string(),
                year: 2025,
            },
            series: SeriesSnapshot {
                series_id: SeriesId::new(),
                name: "Series A".to_string(),
            },
            tickets: (1..=lines).map(|d| line(u32::try_from(d).unwrap())).collect(),
            amount,
            price: Money::from_rupiah(50_000),
            grand_total: Money::from_rupiah(50_000 * u64::from(amount)),
            invoice: Invoice {
                external_id: "TIX-20250601-AAAAAA-0001".to_string(),
                gateway_invoice_id: Some("inv_1".to_string()),
                ..Invoice::default()
            },
            status: PurchaseStatus::Pending,
            expires_at: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }

    fn notification(status: &str) -> PaymentNotification {
        PaymentNotification {
            id: "inv_1".to_string(),
            external_id: "TIX-20250601-AAAAAA-0001".to_string(),
            status: status.to_string(),
            paid_at: None,
            payment_method: Some("BANK_TRANSFER".to_string()),
            bank_code: Some("BCA".to_string()),
            payment_channel: Some("BCA".to_string()),
            payment_destination: Some("8808123".to_string()),
            merchant_name: None,
        }
    }

    #[test]
    fn paid_and_settled_are_both_success_in_any_case() {
        assert!(notification("PAID").is_paid());
        assert!(notification("paid").is_paid());
        assert!(notification("Settled").is_paid());
        assert!(!notification("EXPIRED").is_paid());
    }

    #[test]
    fn paid_issues_one_unit_per_admission_with_distinct_codes() {
        let mut purchase = pending(1, 3);
        let effects = SettlementReducer::new()
            .reduce(&mut purchase, notification("PAID").into(), &env())
            .unwrap();

        assert_eq!(purchase.status, PurchaseStatus::Paid);
        assert!(purchase.paid_at.is_some());
        assert_eq!(purchase.invoice.bank_code.as_deref(), Some("BCA"));

        let SettlementEffect::IssueUnits(units) = &effects[0] else {
            panic!("expected units first, got {effects:?}");
        };
        assert_eq!(units.len(), 3);
        let codes: std::collections::HashSet<_> = units.iter().map(|u| &u.code).collect();
        assert_eq!(codes.len(), 3);
        assert!(units.iter().all(|u| !u.is_used && u.purchase_id == purchase.id));

        assert_eq!(
            effects[1],
            SettlementEffect::Enqueue(Intent::EmailRedemptionCodes {
                purchase_id: purchase.id
            })
        );
    }

    #[test]
    fn failed_queues_a_credit_per_ticket_line() {
        let mut purchase = pending(2, 2);
        let effects = SettlementReducer::new()
            .reduce(&mut purchase, notification("EXPIRED").into(), &env())
            .unwrap();

        assert_eq!(purchase.status, PurchaseStatus::Failed);
        assert!(purchase.paid_at.is_none());
        assert_eq!(effects.len(), 2);
        for (effect, ticket) in effects.iter().zip(&purchase.tickets) {
            assert_eq!(
                effect,
                &SettlementEffect::Enqueue(Intent::CreditInventory {
                    purchase_id: purchase.id,
                    ticket_id: ticket.ticket_id,
                    amount: 2,
                })
            );
        }
    }

    #[test]
    fn terminal_purchases_refuse_any_further_transition() {
        let mut purchase = pending(1, 1);
        purchase.status = PurchaseStatus::Paid;
        let before = purchase.clone();

        let result = SettlementReducer::new().reduce(&mut purchase, notification("PAID").into(), &env());

        assert!(matches!(result, Err(TicketingError::StateConflict(_))));
        assert_eq!(purchase, before);
    }
}
