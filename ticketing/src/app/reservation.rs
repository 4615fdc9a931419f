//! Checkout.
//!
//! ```text
//! validate ─▶ resolve tickets ─▶ snapshot ─▶ debit all ─▶ payment link ─▶ insert Pending
//!                                              │              │              │
//!                                              └──────────────┴──────────────┴─▶ credit back
//! ```
//!
//! Inventory is debited before anything is persisted, so two checkouts racing
//! for the last units cannot both succeed. Every failure after the first
//! debit gives the units back before returning.
//!
//! Each checkout runs on its own task. Dropping the `reserve` future (request
//! timeout, client gone) stops the wait, not the checkout: the task still
//! ends in a stored purchase or a credit-back.
//!
//! A purchase with a zero total has no invoice to wait for and is settled as
//! paid right after it is stored.

use super::settlement::into_writes;
use super::Stores;
use crate::metrics;
use matchday_core::environment::{Clock, CodeGenerator};
use matchday_core::external_id::{external_id, wib_day_bounds};
use matchday_core::gateway::{InvoiceRequest, PaymentGateway};
use matchday_core::intent::{Intent, OutboxEntry};
use matchday_core::reducer::Reducer;
use matchday_core::settlement::{
    PaymentDetails, SettlementAction, SettlementEnvironment, SettlementReducer,
};
use matchday_core::store::CommitOutcome;
use matchday_core::types::{
    BuyerSnapshot, Invoice, MemberId, Money, Product, Purchase, PurchaseId, PurchaseStatus,
    SeasonSnapshot, SeriesId, SeriesSnapshot, Ticket, TicketId, TicketPurchase, TicketSnapshot,
};
use matchday_core::{LedgerError, Result, TicketingError};
use matchday_runtime::retry::retry_with_predicate;
use matchday_runtime::{OutboxWaker, RetryPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Checkout rules.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Largest `amount` one checkout may request
    pub max_units: u32,
    /// Prefix of generated external invoice ids
    pub external_id_prefix: String,
    /// In-request retries for crediting inventory back
    pub credit_retry: RetryPolicy,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            max_units: 4,
            external_id_prefix: "TIX".to_string(),
            credit_retry: RetryPolicy::builder()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(50))
                .max_delay(Duration::from_millis(200))
                .build(),
        }
    }
}

/// A buyer's purchase with whatever units it has issued so far.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    /// The purchase
    pub purchase: Purchase,
    /// Redeemable units; empty until the purchase is paid
    pub units: Vec<TicketPurchase>,
}

/// Tickets and pricing a product resolves to.
struct Resolved {
    tickets: Vec<Ticket>,
    series_id: SeriesId,
    price: Money,
}

/// Checkout service.
pub struct ReservationService {
    checkout: Checkout,
}

/// Everything one checkout task needs; cloned into the task.
#[derive(Clone)]
struct Checkout {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    settings: CheckoutSettings,
    waker: Option<OutboxWaker>,
}

impl ReservationService {
    /// Create a new reservation service
    #[must_use]
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CodeGenerator>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            checkout: Checkout {
                stores,
                gateway,
                clock,
                codes,
                settings,
                waker: None,
            },
        }
    }

    /// Wake this outbox worker when a credit-back is deferred or a free
    /// purchase is settled.
    #[must_use]
    pub fn with_waker(mut self, waker: OutboxWaker) -> Self {
        self.checkout.waker = Some(waker);
        self
    }

    /// Check out `amount` admissions of `product` for `buyer_id`.
    ///
    /// For a series, `amount` admissions of every ticket in it are reserved
    /// at the package price.
    ///
    /// # Errors
    ///
    /// - `Validation`: `amount` out of range, empty series, total overflows
    /// - `NotFound`: unknown product, buyer, season or venue
    /// - `Quota`: a ticket has fewer than `amount` remaining
    /// - `Gateway`: no payment link could be created
    /// - `Persistence`: storage failed
    /// - `Aborted`: the checkout task panicked or the runtime shut down
    ///
    /// Inventory is restored before any error after the first debit.
    #[tracing::instrument(skip(self), fields(buyer_id = %buyer_id))]
    pub async fn reserve(
        &self,
        buyer_id: &MemberId,
        product: Product,
        amount: u32,
    ) -> Result<Purchase> {
        let started = Instant::now();
        let checkout = self.checkout.clone();
        let buyer_id = *buyer_id;
        let task = tokio::spawn(
            async move { checkout.run(&buyer_id, product, amount).await }.in_current_span(),
        );

        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "Checkout task did not finish");
                Err(TicketingError::Aborted(err.to_string()))
            }
        };

        let status = match &result {
            Ok(purchase) if purchase.grand_total.is_zero() => "free",
            Ok(_) => "created",
            Err(TicketingError::Quota { .. }) => {
                metrics::record_quota_rejection();
                "rejected"
            }
            Err(_) => "failed",
        };
        metrics::record_checkout(status, started.elapsed());

        result
    }

    /// A buyer's own purchase with its units.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such purchase, or it belongs to someone else
    /// - `Persistence`: storage failed
    pub async fn purchase(&self, purchase_id: &PurchaseId, buyer_id: &MemberId) -> Result<Receipt> {
        let stores = &self.checkout.stores;
        let purchase = stores
            .purchases
            .purchase(purchase_id)
            .await?
            .filter(|p| p.buyer.member_id == *buyer_id)
            .ok_or_else(|| TicketingError::not_found("purchase", purchase_id))?;

        let units = stores.units.units_for_purchase(purchase_id).await?;

        Ok(Receipt { purchase, units })
    }
}

impl Checkout {
    async fn run(&self, buyer_id: &MemberId, product: Product, amount: u32) -> Result<Purchase> {
        if amount == 0 || amount > self.settings.max_units {
            return Err(TicketingError::validation(
                "amount",
                format!("must be between 1 and {}", self.settings.max_units),
            ));
        }

        let resolved = self.resolve(product).await?;

        for ticket in &resolved.tickets {
            let quota = self.stores.ledger.remaining(&ticket.id).await?;
            if !quota.covers(amount) {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    remaining = quota.remaining(),
                    requested = amount,
                    "Not enough tickets left"
                );
                return Err(TicketingError::Quota {
                    ticket_id: ticket.id,
                    requested: amount,
                    remaining: quota.remaining(),
                });
            }
        }

        let mut purchase = self.draft(buyer_id, &resolved, amount).await?;

        let mut debited: Vec<TicketId> = Vec::with_capacity(resolved.tickets.len());
        for ticket in &resolved.tickets {
            match self.stores.ledger.debit(&ticket.id, amount).await {
                Ok(_) => debited.push(ticket.id),
                Err(err) => {
                    self.credit_back(purchase.id, &debited, amount).await;
                    if let LedgerError::Insufficient { remaining, .. } = &err {
                        tracing::warn!(
                            ticket_id = %ticket.id,
                            remaining,
                            requested = amount,
                            "Debit refused, stock was taken concurrently"
                        );
                    }
                    return Err(err.into());
                }
            }
        }

        if !purchase.grand_total.is_zero() {
            match self
                .gateway
                .create_payment_link(InvoiceRequest::for_purchase(&purchase))
                .await
            {
                Ok(link) => {
                    purchase.invoice.gateway_invoice_id = Some(link.gateway_invoice_id);
                    purchase.invoice.payment_url = Some(link.payment_url);
                    purchase.invoice.merchant_name = Some(link.merchant_name);
                    purchase.expires_at = Some(link.expires_at);
                }
                Err(err) => {
                    tracing::warn!(
                        external_id = %purchase.invoice.external_id,
                        error = %err,
                        "Payment link creation failed"
                    );
                    self.credit_back(purchase.id, &debited, amount).await;
                    return Err(err.into());
                }
            }
        }

        if let Err(err) = self.stores.purchases.insert_purchase(&purchase).await {
            tracing::error!(
                purchase_id = %purchase.id,
                external_id = %purchase.invoice.external_id,
                error = %err,
                "Failed to persist purchase"
            );
            self.credit_back(purchase.id, &debited, amount).await;
            return Err(err.into());
        }

        tracing::info!(
            purchase_id = %purchase.id,
            external_id = %purchase.invoice.external_id,
            amount,
            grand_total = purchase.grand_total.rupiah(),
            "Purchase created"
        );

        if purchase.grand_total.is_zero() {
            self.settle_free(&mut purchase).await?;
        }

        Ok(purchase)
    }

    /// Mark a stored free purchase paid and issue its units.
    ///
    /// If that commit fails the purchase is failed instead, so its units
    /// return to sale through the outbox rather than staying held.
    async fn settle_free(&self, purchase: &mut Purchase) -> Result<()> {
        let env = SettlementEnvironment::new(self.clock.clone(), self.codes.clone());
        let reducer = SettlementReducer::new();

        let mut paid = purchase.clone();
        let effects = reducer.reduce(
            &mut paid,
            SettlementAction::MarkPaid {
                paid_at: None,
                details: PaymentDetails::default(),
            },
            &env,
        )?;
        let (units, entries) = into_writes(effects, self.clock.now());

        match self.stores.purchases.commit_paid(&paid, &units, &entries).await {
            Ok(CommitOutcome::Committed) => {
                metrics::record_settlement("paid", units.len());
                tracing::info!(
                    purchase_id = %paid.id,
                    units = units.len(),
                    "Free purchase settled"
                );
                self.wake();
                *purchase = paid;
                Ok(())
            }
            Ok(CommitOutcome::Stale) => Err(TicketingError::conflict(format!(
                "purchase {} was settled concurrently",
                purchase.id
            ))),
            Err(err) => {
                tracing::error!(
                    purchase_id = %purchase.id,
                    error = %err,
                    "Failed to settle free purchase"
                );
                self.abandon(purchase).await;
                Err(err.into())
            }
        }
    }

    /// Fail a stored purchase and queue its credit-backs.
    async fn abandon(&self, purchase: &Purchase) {
        let env = SettlementEnvironment::new(self.clock.clone(), self.codes.clone());
        let mut failed = purchase.clone();
        let effects = match SettlementReducer::new().reduce(
            &mut failed,
            SettlementAction::MarkFailed {
                status: "ABANDONED".to_string(),
            },
            &env,
        ) {
            Ok(effects) => effects,
            Err(err) => {
                tracing::error!(purchase_id = %purchase.id, error = %err, "Cannot abandon purchase");
                return;
            }
        };
        let (_, entries) = into_writes(effects, self.clock.now());

        match self.stores.purchases.commit_failed(&failed, &entries).await {
            Ok(_) => self.wake(),
            Err(err) => tracing::error!(
                purchase_id = %purchase.id,
                error = %err,
                "Purchase left pending, inventory needs manual correction"
            ),
        }
    }

    fn wake(&self) {
        if let Some(waker) = &self.waker {
            waker.wake();
        }
    }

    async fn resolve(&self, product: Product) -> Result<Resolved> {
        match product {
            Product::Ticket(id) => {
                let ticket = self
                    .stores
                    .catalog
                    .ticket(&id)
                    .await?
                    .ok_or_else(|| TicketingError::not_found("ticket", id))?;
                Ok(Resolved {
                    series_id: ticket.series_id,
                    price: ticket.price,
                    tickets: vec![ticket],
                })
            }
            Product::Series(id) => {
                let series = self
                    .stores
                    .catalog
                    .series(&id)
                    .await?
                    .ok_or_else(|| TicketingError::not_found("series", id))?;
                let tickets = self.stores.catalog.tickets_in_series(&id).await?;
                if tickets.is_empty() {
                    return Err(TicketingError::validation(
                        "series_id",
                        format!("series {id} has no tickets on sale"),
                    ));
                }
                Ok(Resolved {
                    tickets,
                    series_id: id,
                    price: series.package_price,
                })
            }
        }
    }

    /// Build the pending purchase: snapshots, totals and the external id.
    async fn draft(&self, buyer_id: &MemberId, resolved: &Resolved, amount: u32) -> Result<Purchase> {
        let catalog = &self.stores.catalog;

        let buyer = catalog
            .member(buyer_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("member", buyer_id))?;
        let series = catalog
            .series(&resolved.series_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("series", resolved.series_id))?;
        let season = catalog
            .season(&series.season_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("season", series.season_id))?;

        let mut tickets = Vec::with_capacity(resolved.tickets.len());
        for ticket in &resolved.tickets {
            let venue = catalog
                .venue(&ticket.venue_id)
                .await?
                .ok_or_else(|| TicketingError::not_found("venue", ticket.venue_id))?;
            tickets.push(TicketSnapshot::capture(ticket, &venue));
        }

        let grand_total = resolved
            .price
            .checked_multiply(amount)
            .ok_or_else(|| TicketingError::validation("amount", "total price overflows"))?;

        let now = self.clock.now();
        let (day_start, day_end) = wib_day_bounds(now);
        let sequence = self
            .stores
            .purchases
            .count_created_between(day_start, day_end)
            .await?
            + 1;

        Ok(Purchase {
            id: PurchaseId::new(),
            buyer: BuyerSnapshot::from(&buyer),
            season: SeasonSnapshot::from(&season),
            series: SeriesSnapshot::from(&series),
            tickets,
            amount,
            price: resolved.price,
            grand_total,
            invoice: Invoice {
                external_id: external_id(
                    &self.settings.external_id_prefix,
                    now,
                    &self.codes.invoice_suffix(),
                    sequence,
                ),
                ..Invoice::default()
            },
            status: PurchaseStatus::Pending,
            expires_at: None,
            paid_at: None,
            created_at: now,
        })
    }

    /// Return `amount` units of every debited ticket.
    ///
    /// Retries briefly in-request; what still fails is handed to the outbox.
    async fn credit_back(&self, purchase_id: PurchaseId, debited: &[TicketId], amount: u32) {
        let mut deferred = false;

        for ticket_id in debited {
            let credited = retry_with_predicate(
                &self.settings.credit_retry,
                || self.stores.ledger.credit(ticket_id, amount),
                |err| matches!(err, LedgerError::Store(_)),
            )
            .await;

            match credited {
                Ok(quota) => {
                    metrics::record_credit_back("applied");
                    tracing::debug!(
                        ticket_id = %ticket_id,
                        remaining = quota.remaining(),
                        "Inventory credited back"
                    );
                }
                Err(err) => {
                    metrics::record_credit_back("deferred");
                    let entry = OutboxEntry::new(
                        Intent::CreditInventory {
                            purchase_id,
                            ticket_id: *ticket_id,
                            amount,
                        },
                        self.clock.now(),
                    );
                    match self.stores.outbox.enqueue(&entry).await {
                        Ok(()) => {
                            deferred = true;
                            tracing::warn!(
                                ticket_id = %ticket_id,
                                amount,
                                error = %err,
                                "Credit-back deferred to the outbox"
                            );
                        }
                        Err(enqueue_err) => tracing::error!(
                            ticket_id = %ticket_id,
                            amount,
                            error = %err,
                            enqueue_error = %enqueue_err,
                            "Credit-back lost, inventory needs manual correction"
                        ),
                    }
                }
            }
        }

        if deferred {
            self.wake();
        }
    }
}
