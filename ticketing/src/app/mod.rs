//! Application services - the imperative shell around the core reducers.
//!
//! Each service owns one workflow:
//! - [`ReservationService`]: checkout, debiting inventory and opening a payment link
//! - [`SettlementService`]: the payment webhook's `Pending → {Paid, Failed}` step
//! - [`RedemptionService`]: admitting a code at the gate
//! - [`TicketingDispatcher`]: executing outbox intents in the background
//!
//! Services talk to storage through the [`Stores`] bundle so the same code
//! runs over Postgres in production and the in-memory store in tests.

mod dispatcher;
mod mailer;
mod redemption;
mod reservation;
mod settlement;

pub use dispatcher::TicketingDispatcher;
pub use mailer::LogMailer;
pub use redemption::RedemptionService;
pub use reservation::{CheckoutSettings, Receipt, ReservationService};
pub use settlement::SettlementService;

use matchday_core::store::{
    Catalog, InventoryLedger, OutboxStore, PurchaseStore, TicketPurchaseStore,
};
use std::sync::Arc;

/// Every storage seam a service may need, usually backed by one store.
#[derive(Clone)]
pub struct Stores {
    /// Read-only catalog lookups
    pub catalog: Arc<dyn Catalog>,
    /// Atomic quota debit/credit
    pub ledger: Arc<dyn InventoryLedger>,
    /// Purchases and their transitions
    pub purchases: Arc<dyn PurchaseStore>,
    /// Redeemable units
    pub units: Arc<dyn TicketPurchaseStore>,
    /// Durable intents
    pub outbox: Arc<dyn OutboxStore>,
}

impl Stores {
    /// Use one store for every seam.
    #[must_use]
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: Catalog + InventoryLedger + PurchaseStore + TicketPurchaseStore + OutboxStore + 'static,
    {
        Self {
            catalog: store.clone(),
            ledger: store.clone(),
            purchases: store.clone(),
            units: store.clone(),
            outbox: store,
        }
    }
}
