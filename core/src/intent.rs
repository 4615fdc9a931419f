//! Durable side-effect intents.
//!
//! A transition that must trigger work outside the database (crediting
//! inventory back, emailing redemption codes) records an [`Intent`] in the same
//! transaction as the state change. The outbox worker in `matchday-runtime`
//! dispatches them with retries, so a crashed process cannot lose a credit-back.

use crate::types::{OutboxEntryId, PurchaseId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Work to perform once a transition is committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Return units debited by a purchase whose payment failed.
    CreditInventory {
        /// Purchase being compensated
        purchase_id: PurchaseId,
        /// Ticket to credit
        ticket_id: TicketId,
        /// Units to return
        amount: u32,
    },

    /// Email the buyer their redemption codes.
    EmailRedemptionCodes {
        /// Paid purchase
        purchase_id: PurchaseId,
    },
}

impl Intent {
    /// Short label used in logs, metrics and the outbox `kind` column.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreditInventory { .. } => "credit_inventory",
            Self::EmailRedemptionCodes { .. } => "email_redemption_codes",
        }
    }

    /// The purchase this intent belongs to.
    #[must_use]
    pub const fn purchase_id(&self) -> PurchaseId {
        match self {
            Self::CreditInventory { purchase_id, .. }
            | Self::EmailRedemptionCodes { purchase_id } => *purchase_id,
        }
    }
}

/// An intent waiting in the outbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Entry ID
    pub id: OutboxEntryId,
    /// What to do
    pub intent: Intent,
    /// Failed dispatch attempts so far
    pub attempts: u32,
    /// Earliest time the next attempt may run
    pub next_attempt_at: DateTime<Utc>,
    /// Error from the most recent failed attempt
    pub last_error: Option<String>,
    /// When the intent was recorded
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// A fresh entry, due immediately.
    #[must_use]
    pub fn new(intent: Intent, now: DateTime<Utc>) -> Self {
        Self {
            id: OutboxEntryId::new(),
            intent,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_serialize_with_a_type_tag() {
        let purchase_id = PurchaseId::new();
        let intent = Intent::EmailRedemptionCodes { purchase_id };

        let json = serde_json::to_value(&intent).unwrap_or_default();
        assert_eq!(json["type"], "email_redemption_codes");
        assert_eq!(intent.kind(), "email_redemption_codes");
        assert_eq!(intent.purchase_id(), purchase_id);
    }
}
