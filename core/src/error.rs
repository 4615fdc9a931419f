//! Error taxonomy for ticket sales.
//!
//! [`TicketingError`] is what services return to callers. The narrower
//! [`StoreError`] and [`LedgerError`] come out of storage implementations and
//! convert into it with `?`.

use crate::gateway::GatewayError;
use crate::types::TicketId;
use chrono::NaiveDate;
use thiserror::Error;

/// Convenience alias used throughout the services.
pub type Result<T> = std::result::Result<T, TicketingError>;

/// Errors surfaced by the reservation, settlement and redemption services.
#[derive(Error, Debug)]
pub enum TicketingError {
    /// Missing or invalid input.
    #[error("invalid `{field}`: {message}")]
    Validation {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// A referenced record does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of record
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Not enough stock left for the requested amount.
    #[error("ticket {ticket_id} has {remaining} left, {requested} requested")]
    Quota {
        /// Ticket that ran out
        ticket_id: TicketId,
        /// Units requested
        requested: u32,
        /// Units remaining when the debit was refused
        remaining: u32,
    },

    /// The payment gateway could not create a payment link.
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Storage failed.
    #[error("storage error: {0}")]
    Persistence(#[from] StoreError),

    /// The record is no longer in a state that allows this action.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// A background step ended without producing a result (it panicked or
    /// the runtime is shutting down).
    #[error("aborted: {0}")]
    Aborted(String),

    /// A ticket was presented on a day it is not valid for.
    #[error("ticket is valid on {scheduled}, today is {today}")]
    WrongDay {
        /// The ticket's match day
        scheduled: NaiveDate,
        /// Today's WIB date
        today: NaiveDate,
    },
}

impl TicketingError {
    /// Build a [`TicketingError::Validation`].
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Build a [`TicketingError::NotFound`].
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Build a [`TicketingError::StateConflict`].
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::StateConflict(message.into())
    }

    /// Whether a caller may retry the same request and expect progress.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Errors from storage implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors from the inventory ledger's atomic primitives.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The debit would push `used` past `stock`.
    #[error("ticket {ticket_id} has {remaining} left, {requested} requested")]
    Insufficient {
        /// Ticket
        ticket_id: TicketId,
        /// Units requested
        requested: u32,
        /// Units remaining at the time of the refusal
        remaining: u32,
    },

    /// No ticket with this id.
    #[error("ticket {0} not found")]
    UnknownTicket(TicketId),

    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LedgerError> for TicketingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Insufficient {
                ticket_id,
                requested,
                remaining,
            } => Self::Quota {
                ticket_id,
                requested,
                remaining,
            },
            LedgerError::UnknownTicket(ticket_id) => Self::not_found("ticket", ticket_id),
            LedgerError::Store(err) => Self::Persistence(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_refusal_becomes_quota_error() {
        let ticket_id = TicketId::new();
        let err: TicketingError = LedgerError::Insufficient {
            ticket_id,
            requested: 1,
            remaining: 0,
        }
        .into();

        assert!(matches!(err, TicketingError::Quota { remaining: 0, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_storage_failures_are_retryable() {
        let err: TicketingError = StoreError::Database("connection reset".into()).into();
        assert!(err.is_retryable());
        assert_eq!(
            TicketingError::not_found("purchase", "abc").to_string(),
            "purchase abc not found"
        );
    }
}
