//! Payment webhook handling.
//!
//! The reducer decides the transition; this service loads the purchase,
//! commits what the reducer produced in one conditional transaction and wakes
//! the outbox worker.

use super::Stores;
use crate::metrics;
use matchday_core::environment::Clock;
use matchday_core::intent::OutboxEntry;
use matchday_core::reducer::Reducer;
use matchday_core::settlement::{
    PaymentNotification, SettlementAction, SettlementEffect, SettlementEnvironment,
    SettlementOutcome, SettlementReducer,
};
use chrono::{DateTime, Utc};
use matchday_core::store::CommitOutcome;
use matchday_core::types::{Purchase, PurchaseStatus, TicketPurchase};
use matchday_core::{Result, TicketingError};
use matchday_runtime::OutboxWaker;
use std::sync::Arc;

/// Split reducer effects into the rows a transition commits.
pub(super) fn into_writes(
    effects: impl IntoIterator<Item = SettlementEffect>,
    now: DateTime<Utc>,
) -> (Vec<TicketPurchase>, Vec<OutboxEntry>) {
    let mut units = Vec::new();
    let mut entries = Vec::new();
    for effect in effects {
        match effect {
            SettlementEffect::IssueUnits(issued) => units.extend(issued),
            SettlementEffect::Enqueue(intent) => entries.push(OutboxEntry::new(intent, now)),
        }
    }
    (units, entries)
}

/// Settlement service.
pub struct SettlementService {
    stores: Stores,
    reducer: SettlementReducer,
    env: SettlementEnvironment,
    clock: Arc<dyn Clock>,
    waker: Option<OutboxWaker>,
}

impl SettlementService {
    /// Create a new settlement service
    #[must_use]
    pub fn new(stores: Stores, env: SettlementEnvironment) -> Self {
        Self {
            stores,
            reducer: SettlementReducer::new(),
            clock: env.clock.clone(),
            env,
            waker: None,
        }
    }

    /// Wake this outbox worker after every committed transition.
    #[must_use]
    pub fn with_waker(mut self, waker: OutboxWaker) -> Self {
        self.waker = Some(waker);
        self
    }

    /// Apply a payment notification.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no purchase matches `(id, external_id)`
    /// - `StateConflict`: the purchase already left `Pending` (duplicate or
    ///   late delivery), including a concurrent delivery that won the race
    /// - `Persistence`: storage failed; nothing was written and the gateway
    ///   may redeliver
    #[tracing::instrument(
        skip(self, notification),
        fields(external_id = %notification.external_id, status = %notification.status)
    )]
    pub async fn handle_notification(
        &self,
        notification: PaymentNotification,
    ) -> Result<SettlementOutcome> {
        let Some(mut purchase) = self
            .stores
            .purchases
            .find_by_invoice(&notification.id, &notification.external_id)
            .await?
        else {
            tracing::warn!(gateway_invoice_id = %notification.id, "Notification for unknown purchase");
            return Err(TicketingError::not_found(
                "purchase",
                &notification.external_id,
            ));
        };

        let effects = match self.reducer.reduce(
            &mut purchase,
            SettlementAction::from(notification),
            &self.env,
        ) {
            Ok(effects) => effects,
            Err(err) => {
                metrics::record_settlement("duplicate", 0);
                tracing::warn!(purchase_id = %purchase.id, error = %err, "Duplicate notification");
                return Err(err);
            }
        };

        let (units, entries) = into_writes(effects, self.clock.now());

        let committed = match purchase.status {
            PurchaseStatus::Paid => {
                self.stores
                    .purchases
                    .commit_paid(&purchase, &units, &entries)
                    .await
            }
            _ => self.stores.purchases.commit_failed(&purchase, &entries).await,
        };

        let committed = match committed {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(purchase_id = %purchase.id, error = %err, "Failed to commit settlement");
                return Err(err.into());
            }
        };

        if committed == CommitOutcome::Stale {
            metrics::record_settlement("duplicate", 0);
            tracing::warn!(purchase_id = %purchase.id, "Purchase settled concurrently");
            return Err(TicketingError::conflict(format!(
                "purchase {} was settled concurrently",
                purchase.id
            )));
        }

        if let Some(waker) = &self.waker {
            waker.wake();
        }

        let outcome = match purchase.status {
            PurchaseStatus::Paid => SettlementOutcome::Paid {
                units_issued: units.len(),
            },
            _ => SettlementOutcome::Failed {
                credits_queued: entries.len(),
            },
        };

        metrics::record_settlement(outcome.as_str(), units.len());
        tracing::info!(
            purchase_id = %purchase.id,
            outcome = outcome.as_str(),
            units = units.len(),
            "Purchase settled"
        );

        Ok(outcome)
    }

    /// Paid purchases that own no units.
    ///
    /// Each one is logged as an inconsistency; units are never re-created
    /// here.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the query fails.
    pub async fn reconcile(&self) -> Result<Vec<Purchase>> {
        let orphans = self.stores.purchases.paid_without_units().await?;

        for purchase in &orphans {
            tracing::error!(
                purchase_id = %purchase.id,
                external_id = %purchase.invoice.external_id,
                expected_units = purchase.expected_units(),
                "Paid purchase has no units"
            );
        }

        if orphans.is_empty() {
            tracing::debug!("Reconciliation found no paid purchases without units");
        }

        Ok(orphans)
    }
}
