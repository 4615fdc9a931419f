//! In-memory implementation of every storage trait.
//!
//! One `tokio::sync::Mutex` guards all state, so every trait method is atomic
//! with respect to every other, which is exactly the guarantee the Postgres
//! implementation gets from single-statement updates and transactions.

use chrono::{DateTime, Utc};
use matchday_core::error::{LedgerError, StoreError};
use matchday_core::intent::OutboxEntry;
use matchday_core::store::{
    Catalog, CommitOutcome, CreditOutcome, InventoryLedger, LedgerFuture, OutboxStore, PurchaseStore,
    StoreFuture, TicketPurchaseStore,
};
use matchday_core::types::{
    Member, MemberId, OutboxEntryId, Purchase, PurchaseId, PurchaseStatus, Quota, Season,
    SeasonId, Series, SeriesId, Ticket, TicketId, TicketPurchase, TicketPurchaseId, Venue,
    VenueId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `PurchaseStore::insert_purchase`
    InsertPurchase,
    /// `PurchaseStore::commit_paid` and `commit_failed`
    CommitTransition,
    /// `PurchaseStore::commit_paid` only
    CommitPaid,
    /// `InventoryLedger::credit` and `credit_once`
    Credit,
    /// `OutboxStore::enqueue`
    Enqueue,
    /// Every catalog read
    CatalogRead,
    /// `OutboxStore::complete`
    CompleteOutbox,
}

/// An outbox entry plus its terminal markers.
#[derive(Debug, Clone)]
pub struct StoredOutboxEntry {
    /// The entry as last written
    pub entry: OutboxEntry,
    /// Set once dispatched
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once given up on
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    tickets: HashMap<TicketId, Ticket>,
    series: HashMap<SeriesId, Series>,
    seasons: HashMap<SeasonId, Season>,
    venues: HashMap<VenueId, Venue>,
    members: HashMap<MemberId, Member>,
    purchases: Vec<Purchase>,
    units: Vec<TicketPurchase>,
    outbox: Vec<StoredOutboxEntry>,
    faults: HashSet<Fault>,
    credits: Vec<(TicketId, u32)>,
    credited_entries: HashSet<OutboxEntryId>,
}

impl State {
    fn check(&self, fault: Fault) -> Result<(), StoreError> {
        if self.faults.contains(&fault) {
            Err(StoreError::Database(format!("injected fault: {fault:?}")))
        } else {
            Ok(())
        }
    }

    fn purchase_index(&self, id: &PurchaseId) -> Option<usize> {
        self.purchases.iter().position(|p| p.id == *id)
    }

    fn outbox_entry(&mut self, id: &OutboxEntryId) -> Result<&mut StoredOutboxEntry, StoreError> {
        self.outbox
            .iter_mut()
            .find(|stored| stored.entry.id == *id)
            .ok_or_else(|| StoreError::Database(format!("outbox entry {id} not found")))
    }

    fn push_outbox(&mut self, entries: &[OutboxEntry]) {
        self.outbox
            .extend(entries.iter().cloned().map(|entry| StoredOutboxEntry {
                entry,
                completed_at: None,
                dead_lettered_at: None,
            }));
    }

    /// Shared guard for both transitions.
    fn transition(&mut self, purchase: &Purchase) -> Result<Option<usize>, StoreError> {
        self.check(Fault::CommitTransition)?;
        let index = self
            .purchase_index(&purchase.id)
            .ok_or_else(|| StoreError::Database(format!("purchase {} not found", purchase.id)))?;
        if self.purchases[index].status == PurchaseStatus::Pending {
            Ok(Some(index))
        } else {
            Ok(None)
        }
    }
}

/// In-memory store for tests.
///
/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    /// Add or replace a ticket.
    pub async fn put_ticket(&self, ticket: Ticket) {
        self.state.lock().await.tickets.insert(ticket.id, ticket);
    }

    /// Add or replace a series.
    pub async fn put_series(&self, series: Series) {
        self.state.lock().await.series.insert(series.id, series);
    }

    /// Add or replace a season.
    pub async fn put_season(&self, season: Season) {
        self.state.lock().await.seasons.insert(season.id, season);
    }

    /// Add or replace a venue.
    pub async fn put_venue(&self, venue: Venue) {
        self.state.lock().await.venues.insert(venue.id, venue);
    }

    /// Add or replace a member.
    pub async fn put_member(&self, member: Member) {
        self.state.lock().await.members.insert(member.id, member);
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Make `fault` fail until [`InMemoryStore::heal`] is called.
    pub async fn inject(&self, fault: Fault) {
        self.state.lock().await.faults.insert(fault);
    }

    /// Stop failing `fault`.
    pub async fn heal(&self, fault: Fault) {
        self.state.lock().await.faults.remove(&fault);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current counters of a ticket.
    pub async fn quota(&self, id: &TicketId) -> Option<Quota> {
        self.state.lock().await.tickets.get(id).map(|t| t.quota)
    }

    /// Every stored purchase, in insertion order.
    pub async fn purchases(&self) -> Vec<Purchase> {
        self.state.lock().await.purchases.clone()
    }

    /// Every issued unit, in insertion order.
    pub async fn units(&self) -> Vec<TicketPurchase> {
        self.state.lock().await.units.clone()
    }

    /// Every outbox entry with its terminal markers.
    pub async fn outbox(&self) -> Vec<StoredOutboxEntry> {
        self.state.lock().await.outbox.clone()
    }

    /// Every successful `credit` call, in order.
    pub async fn credits(&self) -> Vec<(TicketId, u32)> {
        self.state.lock().await.credits.clone()
    }

    /// Overwrite a stored purchase without any guard (to set up corrupt data).
    pub async fn force_purchase(&self, purchase: Purchase) {
        let mut state = self.state.lock().await;
        match state.purchase_index(&purchase.id) {
            Some(index) => state.purchases[index] = purchase,
            None => state.purchases.push(purchase),
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

impl Catalog for InMemoryStore {
    fn ticket(&self, id: &TicketId) -> StoreFuture<'_, Option<Ticket>> {
        let id = *id;
        Box::pin(async move {
            let state = self.state.lock().await;
            state.check(Fault::CatalogRead)?;
            Ok(state.tickets.get(&id).cloned())
        })
    }

    fn tickets_in_series(&self, id: &SeriesId) -> StoreFuture<'_, Vec<Ticket>> {
        let id = *id;
        Box::pin(async move {
            let state = self.state.lock().await;
            state.check(Fault::CatalogRead)?;
            let mut tickets: Vec<Ticket> = state
                .tickets
                .values()
                .filter(|t| t.series_id == id)
                .cloned()
                .collect();
            tickets.sort_by_key(|t| t.match_date);
            Ok(tickets)
        })
    }

    fn series(&self, id: &SeriesId) -> StoreFuture<'_, Option<Series>> {
        let id = *id;
        Box::pin(async move {
            let state = self.state.lock().await;
            state.check(Fault::CatalogRead)?;
            Ok(state.series.get(&id).cloned())
        })
    }

    fn season(&self, id: &SeasonId) -> StoreFuture<'_, Option<Season>> {
        let id = *id;
        Box::pin(async move {
            let state = self.state.lock().await;
            state.check(Fault::CatalogRead)?;
            Ok(state.seasons.get(&id).cloned())
        })
    }

    fn venue(&self, id: &VenueId) -> StoreFuture<'_, Option<Venue>> {
        let id = *id;
        Box::pin(async move {
            let state = self.state.lock().await;
            state.check(Fault::CatalogRead)?;
            Ok(state.venues.get(&id).cloned())
        })
    }

    fn member(&self, id: &MemberId) -> StoreFuture<'_, Option<Member>> {
        let id = *id;
        Box::pin(async move {
            let state = self.state.lock().await;
            state.check(Fault::CatalogRead)?;
            Ok(state.members.get(&id).cloned())
        })
    }
}

// ============================================================================
// Inventory ledger
// ============================================================================

impl InventoryLedger for InMemoryStore {
    fn remaining(&self, ticket_id: &TicketId) -> LedgerFuture<'_, Quota> {
        let ticket_id = *ticket_id;
        Box::pin(async move {
            let state = self.state.lock().await;
            state
                .tickets
                .get(&ticket_id)
                .map(|t| t.quota)
                .ok_or(LedgerError::UnknownTicket(ticket_id))
        })
    }

    fn debit(&self, ticket_id: &TicketId, amount: u32) -> LedgerFuture<'_, Quota> {
        let ticket_id = *ticket_id;
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let ticket = state
                .tickets
                .get_mut(&ticket_id)
                .ok_or(LedgerError::UnknownTicket(ticket_id))?;

            let debited = ticket
                .quota
                .debited(amount)
                .ok_or(LedgerError::Insufficient {
                    ticket_id,
                    requested: amount,
                    remaining: ticket.quota.remaining(),
                })?;
            ticket.quota = debited;
            Ok(debited)
        })
    }

    fn credit(&self, ticket_id: &TicketId, amount: u32) -> LedgerFuture<'_, Quota> {
        let ticket_id = *ticket_id;
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check(Fault::Credit)?;
            let ticket = state
                .tickets
                .get_mut(&ticket_id)
                .ok_or(LedgerError::UnknownTicket(ticket_id))?;
            ticket.quota = ticket.quota.credited(amount);
            let quota = ticket.quota;
            state.credits.push((ticket_id, amount));
            Ok(quota)
        })
    }

    fn credit_once<'a>(
        &'a self,
        key: &'a OutboxEntryId,
        ticket_id: &'a TicketId,
        amount: u32,
    ) -> LedgerFuture<'a, CreditOutcome> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check(Fault::Credit)?;
            if state.credited_entries.contains(key) {
                return Ok(CreditOutcome::AlreadyApplied);
            }
            let ticket = state
                .tickets
                .get_mut(ticket_id)
                .ok_or(LedgerError::UnknownTicket(*ticket_id))?;
            ticket.quota = ticket.quota.credited(amount);
            let quota = ticket.quota;
            state.credited_entries.insert(*key);
            state.credits.push((*ticket_id, amount));
            Ok(CreditOutcome::Applied(quota))
        })
    }
}

// ============================================================================
// Purchases
// ============================================================================

impl PurchaseStore for InMemoryStore {
    fn insert_purchase<'a>(&'a self, purchase: &'a Purchase) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check(Fault::InsertPurchase)?;
            if state
                .purchases
                .iter()
                .any(|p| p.id == purchase.id || p.invoice.external_id == purchase.invoice.external_id)
            {
                return Err(StoreError::Database(format!(
                    "duplicate purchase {}",
                    purchase.invoice.external_id
                )));
            }
            state.purchases.push(purchase.clone());
            Ok(())
        })
    }

    fn purchase(&self, id: &PurchaseId) -> StoreFuture<'_, Option<Purchase>> {
        let id = *id;
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.purchases.iter().find(|p| p.id == id).cloned())
        })
    }

    fn find_by_invoice<'a>(
        &'a self,
        gateway_invoice_id: &'a str,
        external_id: &'a str,
    ) -> StoreFuture<'a, Option<Purchase>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .purchases
                .iter()
                .find(|p| {
                    p.invoice.external_id == external_id
                        && p.invoice.gateway_invoice_id.as_deref() == Some(gateway_invoice_id)
                })
                .cloned())
        })
    }

    fn count_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let count = state
                .purchases
                .iter()
                .filter(|p| p.created_at >= from && p.created_at < to)
                .count();
            Ok(count as u64)
        })
    }

    fn commit_paid<'a>(
        &'a self,
        purchase: &'a Purchase,
        units: &'a [TicketPurchase],
        outbox: &'a [OutboxEntry],
    ) -> StoreFuture<'a, CommitOutcome> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check(Fault::CommitPaid)?;
            let Some(index) = state.transition(purchase)? else {
                return Ok(CommitOutcome::Stale);
            };

            let taken: HashSet<&str> = state.units.iter().map(|u| u.code.as_str()).collect();
            if let Some(clash) = units.iter().find(|u| taken.contains(u.code.as_str())) {
                return Err(StoreError::Database(format!(
                    "duplicate redemption code {}",
                    clash.code
                )));
            }

            state.purchases[index] = purchase.clone();
            state.units.extend(units.iter().cloned());
            state.push_outbox(outbox);
            Ok(CommitOutcome::Committed)
        })
    }

    fn commit_failed<'a>(
        &'a self,
        purchase: &'a Purchase,
        outbox: &'a [OutboxEntry],
    ) -> StoreFuture<'a, CommitOutcome> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(index) = state.transition(purchase)? else {
                return Ok(CommitOutcome::Stale);
            };

            state.purchases[index] = purchase.clone();
            state.push_outbox(outbox);
            Ok(CommitOutcome::Committed)
        })
    }

    fn paid_without_units(&self) -> StoreFuture<'_, Vec<Purchase>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let owners: HashSet<PurchaseId> = state.units.iter().map(|u| u.purchase_id).collect();
            Ok(state
                .purchases
                .iter()
                .filter(|p| p.status == PurchaseStatus::Paid && !owners.contains(&p.id))
                .cloned()
                .collect())
        })
    }
}

// ============================================================================
// Redeemable units
// ============================================================================

impl TicketPurchaseStore for InMemoryStore {
    fn unit_by_code<'a>(&'a self, code: &'a str) -> StoreFuture<'a, Option<TicketPurchase>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.units.iter().find(|u| u.code == code).cloned())
        })
    }

    fn units_for_purchase(
        &self,
        purchase_id: &PurchaseId,
    ) -> StoreFuture<'_, Vec<TicketPurchase>> {
        let purchase_id = *purchase_id;
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .units
                .iter()
                .filter(|u| u.purchase_id == purchase_id)
                .cloned()
                .collect())
        })
    }

    fn mark_used(
        &self,
        id: &TicketPurchaseId,
        used_at: DateTime<Utc>,
    ) -> StoreFuture<'_, CommitOutcome> {
        let id = *id;
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.units.iter_mut().find(|u| u.id == id) {
                Some(unit) if !unit.is_used => {
                    unit.is_used = true;
                    unit.used_at = Some(used_at);
                    Ok(CommitOutcome::Committed)
                }
                Some(_) => Ok(CommitOutcome::Stale),
                None => Err(StoreError::Database(format!("unit {id} not found"))),
            }
        })
    }
}

// ============================================================================
// Outbox
// ============================================================================

impl OutboxStore for InMemoryStore {
    fn enqueue<'a>(&'a self, entry: &'a OutboxEntry) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check(Fault::Enqueue)?;
            state.push_outbox(std::slice::from_ref(entry));
            Ok(())
        })
    }

    fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<OutboxEntry>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut due: Vec<&mut StoredOutboxEntry> = state
                .outbox
                .iter_mut()
                .filter(|s| {
                    s.completed_at.is_none()
                        && s.dead_lettered_at.is_none()
                        && s.entry.next_attempt_at <= now
                })
                .collect();
            due.sort_by_key(|s| (s.entry.next_attempt_at, s.entry.created_at));
            due.truncate(limit as usize);

            // Callers see the entry as it was before the lease
            let claimed: Vec<OutboxEntry> = due.iter().map(|s| s.entry.clone()).collect();
            for stored in due {
                stored.entry.next_attempt_at = lease_until;
            }
            Ok(claimed)
        })
    }

    fn complete(&self, id: &OutboxEntryId, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        let id = *id;
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.check(Fault::CompleteOutbox)?;
            state.outbox_entry(&id)?.completed_at = Some(at);
            Ok(())
        })
    }

    fn reschedule<'a>(
        &'a self,
        id: &'a OutboxEntryId,
        next_attempt_at: DateTime<Utc>,
        error: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let stored = state.outbox_entry(id)?;
            stored.entry.attempts += 1;
            stored.entry.next_attempt_at = next_attempt_at;
            stored.entry.last_error = Some(error.to_string());
            Ok(())
        })
    }

    fn dead_letter<'a>(
        &'a self,
        id: &'a OutboxEntryId,
        at: DateTime<Utc>,
        error: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let stored = state.outbox_entry(id)?;
            stored.entry.attempts += 1;
            stored.entry.last_error = Some(error.to_string());
            stored.dead_lettered_at = Some(at);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::CatalogFixture;

    #[tokio::test]
    async fn debit_is_refused_past_stock() {
        let store = InMemoryStore::new();
        let catalog = CatalogFixture::single_day(&store, 10).await;
        let ticket = catalog.tickets[0].id;
        store.debit(&ticket, 7).await.unwrap();

        let err = store.debit(&ticket, 4).await.unwrap_err();
        assert!(matches!(err, LedgerError::Insufficient { remaining: 3, .. }));
        assert_eq!(store.quota(&ticket).await, Some(Quota::new(10, 7)));
    }

    #[tokio::test]
    async fn injected_faults_fail_until_healed() {
        let store = InMemoryStore::new();
        let catalog = CatalogFixture::single_day(&store, 10).await;
        let ticket = catalog.tickets[0].id;

        store.inject(Fault::Credit).await;
        assert!(store.credit(&ticket, 1).await.is_err());

        store.heal(Fault::Credit).await;
        assert!(store.credit(&ticket, 1).await.is_ok());
    }

    #[tokio::test]
    async fn credit_once_ignores_a_repeated_key() {
        let store = InMemoryStore::new();
        let catalog = CatalogFixture::single_day(&store, 10).await;
        let ticket = catalog.tickets[0].id;
        let key = OutboxEntryId::new();
        store.debit(&ticket, 4).await.unwrap();

        let first = store.credit_once(&key, &ticket, 2).await.unwrap();
        let second = store.credit_once(&key, &ticket, 2).await.unwrap();

        assert_eq!(first, CreditOutcome::Applied(Quota::new(10, 2)));
        assert_eq!(second, CreditOutcome::AlreadyApplied);
        assert_eq!(store.quota(&ticket).await, Some(Quota::new(10, 2)));
    }

    #[tokio::test]
    async fn claimed_entries_are_hidden_until_the_lease_ends() {
        use matchday_core::intent::Intent;

        let store = InMemoryStore::new();
        let now = Utc::now();
        let entry = OutboxEntry::new(
            Intent::EmailRedemptionCodes {
                purchase_id: PurchaseId::new(),
            },
            now,
        );
        store.enqueue(&entry).await.unwrap();
        let lease = now + chrono::Duration::seconds(60);

        let claimed = store.claim_due(now, lease, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].next_attempt_at, now);

        assert!(store.claim_due(now, lease, 10).await.unwrap().is_empty());
        assert_eq!(store.claim_due(lease, lease, 10).await.unwrap().len(), 1);
    }
}
