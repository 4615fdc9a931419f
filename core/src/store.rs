//! Storage and catalog abstractions.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `matchday-postgres`): production storage
//! - `InMemoryStore` (in `matchday-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Every trait returns an explicit `Pin<Box<dyn Future>>` instead of using
//! `async fn`, so services can hold them as `Arc<dyn Trait>`.

use crate::error::{LedgerError, StoreError};
use crate::intent::OutboxEntry;
use crate::types::{
    Member, MemberId, OutboxEntryId, Purchase, PurchaseId, Quota, Season, SeasonId, Series,
    SeriesId, Ticket, TicketId, TicketPurchase, TicketPurchaseId, Venue, VenueId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by storage traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Boxed future returned by the inventory ledger.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Result of a conditional write guarded by the record's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The guard held and the write was applied.
    Committed,
    /// Another writer got there first; nothing was written.
    Stale,
}

/// Result of a credit keyed by the outbox entry that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// First delivery; the units went back on sale.
    Applied(Quota),
    /// This entry's credit was already recorded; nothing changed.
    AlreadyApplied,
}

// ============================================================================
// Catalog (owned by the surrounding application)
// ============================================================================

/// Read-only lookups into catalog data managed elsewhere.
pub trait Catalog: Send + Sync {
    /// Load a ticket.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn ticket(&self, id: &TicketId) -> StoreFuture<'_, Option<Ticket>>;

    /// Every ticket belonging to a series, ordered by match date.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn tickets_in_series(&self, id: &SeriesId) -> StoreFuture<'_, Vec<Ticket>>;

    /// Load a series.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn series(&self, id: &SeriesId) -> StoreFuture<'_, Option<Series>>;

    /// Load a season.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn season(&self, id: &SeasonId) -> StoreFuture<'_, Option<Season>>;

    /// Load a venue.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn venue(&self, id: &VenueId) -> StoreFuture<'_, Option<Venue>>;

    /// Load a member.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn member(&self, id: &MemberId) -> StoreFuture<'_, Option<Member>>;
}

// ============================================================================
// Inventory ledger
// ============================================================================

/// Owner of every ticket's `used` counter.
///
/// Implementations must apply `debit` and `credit` as single storage-side
/// updates (never load, modify and write back), so concurrent calls against
/// one ticket serialize.
pub trait InventoryLedger: Send + Sync {
    /// Current counters; `remaining` is derived from them on every call.
    ///
    /// # Errors
    ///
    /// - `UnknownTicket`: no such ticket
    /// - `Store`: query failed
    fn remaining(&self, ticket_id: &TicketId) -> LedgerFuture<'_, Quota>;

    /// Atomically add `amount` to `used` if at least `amount` remain.
    ///
    /// # Errors
    ///
    /// - `Insufficient`: fewer than `amount` remain; nothing changed
    /// - `UnknownTicket`: no such ticket
    /// - `Store`: update failed
    fn debit(&self, ticket_id: &TicketId, amount: u32) -> LedgerFuture<'_, Quota>;

    /// Atomically subtract `amount` from `used`, never below zero.
    ///
    /// # Errors
    ///
    /// - `UnknownTicket`: no such ticket
    /// - `Store`: update failed
    fn credit(&self, ticket_id: &TicketId, amount: u32) -> LedgerFuture<'_, Quota>;

    /// Credit on behalf of outbox entry `key`, at most once per key.
    ///
    /// Recording the key and applying the credit happen in one atomic step,
    /// so a redelivered entry finds the key and leaves `used` alone.
    ///
    /// # Errors
    ///
    /// - `UnknownTicket`: no such ticket; the key is not recorded
    /// - `Store`: update failed; the key is not recorded
    fn credit_once<'a>(
        &'a self,
        key: &'a OutboxEntryId,
        ticket_id: &'a TicketId,
        amount: u32,
    ) -> LedgerFuture<'a, CreditOutcome>;
}

// ============================================================================
// Purchases
// ============================================================================

/// Persistence for purchases and their settlement transitions.
pub trait PurchaseStore: Send + Sync {
    /// Insert a new pending purchase.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails (including a duplicate external id).
    fn insert_purchase<'a>(&'a self, purchase: &'a Purchase) -> StoreFuture<'a, ()>;

    /// Load a purchase by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn purchase(&self, id: &PurchaseId) -> StoreFuture<'_, Option<Purchase>>;

    /// Find the purchase matching a webhook's idempotency key.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn find_by_invoice<'a>(
        &'a self,
        gateway_invoice_id: &'a str,
        external_id: &'a str,
    ) -> StoreFuture<'a, Option<Purchase>>;

    /// Number of purchases created in `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn count_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, u64>;

    /// Commit a `Pending → Paid` transition.
    ///
    /// In one transaction, and only if the stored row is still pending:
    /// write the purchase, insert every unit, record every outbox entry.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails; nothing is written in that case.
    fn commit_paid<'a>(
        &'a self,
        purchase: &'a Purchase,
        units: &'a [TicketPurchase],
        outbox: &'a [OutboxEntry],
    ) -> StoreFuture<'a, CommitOutcome>;

    /// Commit a `Pending → Failed` transition.
    ///
    /// In one transaction, and only if the stored row is still pending:
    /// write the purchase and record every outbox entry.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails; nothing is written in that case.
    fn commit_failed<'a>(
        &'a self,
        purchase: &'a Purchase,
        outbox: &'a [OutboxEntry],
    ) -> StoreFuture<'a, CommitOutcome>;

    /// Paid purchases that own no units (reconciliation).
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn paid_without_units(&self) -> StoreFuture<'_, Vec<Purchase>>;
}

// ============================================================================
// Redeemable units
// ============================================================================

/// Persistence for redeemable ticket units.
pub trait TicketPurchaseStore: Send + Sync {
    /// Find a unit by its code.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn unit_by_code<'a>(&'a self, code: &'a str) -> StoreFuture<'a, Option<TicketPurchase>>;

    /// Every unit issued by a purchase.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn units_for_purchase(&self, purchase_id: &PurchaseId)
        -> StoreFuture<'_, Vec<TicketPurchase>>;

    /// Mark a unit used, only if it is not used yet.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn mark_used(
        &self,
        id: &TicketPurchaseId,
        used_at: DateTime<Utc>,
    ) -> StoreFuture<'_, CommitOutcome>;
}

// ============================================================================
// Outbox
// ============================================================================

/// Durable queue of intents recorded alongside purchase transitions.
pub trait OutboxStore: Send + Sync {
    /// Record a standalone entry, outside any purchase transition.
    ///
    /// Used when a synchronous credit-back during checkout fails and has to
    /// be retried in the background.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn enqueue<'a>(&'a self, entry: &'a OutboxEntry) -> StoreFuture<'a, ()>;

    /// Claim up to `limit` entries due at `now`, oldest first.
    ///
    /// Claimed entries have `next_attempt_at` pushed to `lease_until`, so a
    /// concurrent worker skips them until the lease runs out. Rows another
    /// worker is claiming at the same moment are skipped, not waited on.
    /// Completed and dead-lettered entries are never returned.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<OutboxEntry>>;

    /// Mark an entry done.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn complete(&self, id: &OutboxEntryId, at: DateTime<Utc>) -> StoreFuture<'_, ()>;

    /// Record a failed attempt and push the next one out.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn reschedule<'a>(
        &'a self,
        id: &'a OutboxEntryId,
        next_attempt_at: DateTime<Utc>,
        error: &'a str,
    ) -> StoreFuture<'a, ()>;

    /// Give up on an entry after its retry budget is spent.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn dead_letter<'a>(
        &'a self,
        id: &'a OutboxEntryId,
        at: DateTime<Utc>,
        error: &'a str,
    ) -> StoreFuture<'a, ()>;
}
