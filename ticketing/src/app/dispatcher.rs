//! Executes outbox intents on behalf of the worker.

use super::Stores;
use matchday_core::intent::{Intent, OutboxEntry};
use matchday_core::mailer::Mailer;
use matchday_core::store::CreditOutcome;
use matchday_core::types::{OutboxEntryId, PurchaseId, PurchaseStatus, TicketId};
use matchday_core::LedgerError;
use matchday_runtime::{DispatchError, IntentDispatcher};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Dispatcher backed by the inventory ledger and the mailer.
pub struct TicketingDispatcher {
    stores: Stores,
    mailer: Arc<dyn Mailer>,
}

impl TicketingDispatcher {
    /// Create a new dispatcher
    #[must_use]
    pub fn new(stores: Stores, mailer: Arc<dyn Mailer>) -> Self {
        Self { stores, mailer }
    }

    /// Keyed by the entry ID, so a redelivered entry never credits twice.
    async fn credit_inventory(
        &self,
        entry_id: &OutboxEntryId,
        purchase_id: PurchaseId,
        ticket_id: &TicketId,
        amount: u32,
    ) -> Result<(), DispatchError> {
        match self
            .stores
            .ledger
            .credit_once(entry_id, ticket_id, amount)
            .await
        {
            Ok(CreditOutcome::Applied(quota)) => {
                tracing::info!(
                    purchase_id = %purchase_id,
                    ticket_id = %ticket_id,
                    amount,
                    remaining = quota.remaining(),
                    "Inventory credited back"
                );
                Ok(())
            }
            Ok(CreditOutcome::AlreadyApplied) => {
                tracing::info!(
                    entry_id = %entry_id,
                    purchase_id = %purchase_id,
                    ticket_id = %ticket_id,
                    "Inventory credit already applied, skipping"
                );
                Ok(())
            }
            Err(LedgerError::UnknownTicket(id)) => {
                Err(DispatchError::Permanent(format!("ticket {id} no longer exists")))
            }
            Err(err) => Err(DispatchError::Failed(err.to_string())),
        }
    }

    async fn email_codes(&self, purchase_id: PurchaseId) -> Result<(), DispatchError> {
        let purchase = self
            .stores
            .purchases
            .purchase(&purchase_id)
            .await
            .map_err(|e| DispatchError::Failed(e.to_string()))?
            .ok_or_else(|| DispatchError::Permanent(format!("purchase {purchase_id} not found")))?;

        if purchase.status != PurchaseStatus::Paid {
            return Err(DispatchError::Permanent(format!(
                "purchase {purchase_id} is {}, not paid",
                purchase.status
            )));
        }

        let units = self
            .stores
            .units
            .units_for_purchase(&purchase_id)
            .await
            .map_err(|e| DispatchError::Failed(e.to_string()))?;

        if units.is_empty() {
            return Err(DispatchError::Permanent(format!(
                "purchase {purchase_id} has no units to send"
            )));
        }

        self.mailer
            .send_redemption_codes(&purchase, &units)
            .await
            .map_err(|e| DispatchError::Failed(e.to_string()))?;

        tracing::info!(
            purchase_id = %purchase_id,
            units = units.len(),
            "Redemption codes sent"
        );
        Ok(())
    }
}

impl IntentDispatcher for TicketingDispatcher {
    fn dispatch<'a>(
        &'a self,
        entry: &'a OutboxEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'a>> {
        Box::pin(async move {
            match &entry.intent {
                Intent::CreditInventory {
                    purchase_id,
                    ticket_id,
                    amount,
                } => {
                    self.credit_inventory(&entry.id, *purchase_id, ticket_id, *amount)
                        .await
                }
                Intent::EmailRedemptionCodes { purchase_id } => {
                    self.email_codes(*purchase_id).await
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use matchday_core::store::InventoryLedger;
    use matchday_testing::{CatalogFixture, InMemoryStore, RecordingMailer};

    fn entry(intent: Intent) -> OutboxEntry {
        OutboxEntry::new(intent, chrono::Utc::now())
    }

    async fn dispatcher(stocks: &[u32]) -> (TicketingDispatcher, InMemoryStore, CatalogFixture) {
        let store = InMemoryStore::new();
        let catalog = CatalogFixture::seed(&store, stocks).await;
        let stores = Stores::shared(Arc::new(store.clone()));
        (
            TicketingDispatcher::new(stores, Arc::new(RecordingMailer::new())),
            store,
            catalog,
        )
    }

    #[tokio::test]
    async fn test_credit_restores_quota() {
        let (dispatcher, store, catalog) = dispatcher(&[10]).await;
        let ticket_id = catalog.tickets[0].id;
        store.debit(&ticket_id, 3).await.unwrap();

        dispatcher
            .dispatch(&entry(Intent::CreditInventory {
                purchase_id: PurchaseId::new(),
                ticket_id,
                amount: 3,
            }))
            .await
            .unwrap();

        assert_eq!(store.quota(&ticket_id).await.unwrap().remaining(), 10);
    }

    #[tokio::test]
    async fn test_redelivered_credit_is_applied_once() {
        let (dispatcher, store, catalog) = dispatcher(&[10]).await;
        let ticket_id = catalog.tickets[0].id;
        store.debit(&ticket_id, 5).await.unwrap();
        let credit = entry(Intent::CreditInventory {
            purchase_id: PurchaseId::new(),
            ticket_id,
            amount: 2,
        });

        dispatcher.dispatch(&credit).await.unwrap();
        // Units sold to someone else in between must stay sold
        store.debit(&ticket_id, 2).await.unwrap();
        dispatcher.dispatch(&credit).await.unwrap();

        assert_eq!(store.quota(&ticket_id).await.unwrap().remaining(), 5);
        assert_eq!(store.credits().await, vec![(ticket_id, 2)]);
    }

    #[tokio::test]
    async fn test_credit_for_deleted_ticket_is_permanent() {
        let (dispatcher, _, _) = dispatcher(&[10]).await;

        let result = dispatcher
            .dispatch(&entry(Intent::CreditInventory {
                purchase_id: PurchaseId::new(),
                ticket_id: TicketId::new(),
                amount: 1,
            }))
            .await;

        assert!(matches!(result, Err(DispatchError::Permanent(_))));
    }

    #[tokio::test]
    async fn test_email_for_missing_purchase_is_permanent() {
        let (dispatcher, _, _) = dispatcher(&[10]).await;

        let result = dispatcher
            .dispatch(&entry(Intent::EmailRedemptionCodes {
                purchase_id: PurchaseId::new(),
            }))
            .await;

        assert!(matches!(result, Err(DispatchError::Permanent(_))));
    }

    #[tokio::test]
    async fn test_email_for_pending_purchase_is_permanent() {
        let (dispatcher, store, catalog) = dispatcher(&[10]).await;
        let purchase = catalog.pending_purchase(1, "TIX-20250601-AAAAAA-0001", chrono::Utc::now());
        store.force_purchase(purchase.clone()).await;

        let result = dispatcher
            .dispatch(&entry(Intent::EmailRedemptionCodes {
                purchase_id: purchase.id,
            }))
            .await;

        assert!(matches!(result, Err(DispatchError::Permanent(_))));
    }
}
