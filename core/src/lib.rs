//! # Matchday Core
//!
//! Domain types, pure reducers and storage traits for selling dated match
//! tickets against a finite stock.
//!
//! ## Core Concepts
//!
//! - **Ticket / Quota**: one dated sellable unit with `stock` and `used`
//!   counters; `remaining` is always derived, never stored
//! - **Purchase**: one buyer's checkout, `Pending` until the payment gateway
//!   reports back, then `Paid` or `Failed` exactly once
//! - **TicketPurchase**: a redeemable admission with a unique opaque code,
//!   created only when a purchase becomes `Paid`
//! - **Reducer**: pure function `(State, Action, Environment) → (State, Effects)`
//!   used for the settlement and redemption state machines
//! - **Environment**: injected clock and code generator
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell: reducers never touch storage
//! - All inventory mutation goes through [`store::InventoryLedger`]
//! - Side effects that must survive a crash are recorded as [`intent::Intent`]s
//!   in the same transaction as the state change that produced them
//!
//! ## Example
//!
//! ```
//! use matchday_core::types::Quota;
//!
//! let quota = Quota::new(10, 7);
//! assert_eq!(quota.remaining(), 3);
//! assert!(quota.debited(4).is_none());
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod external_id;
pub mod gateway;
pub mod intent;
pub mod mailer;
pub mod redemption;
pub mod settlement;
pub mod store;
pub mod types;

pub use error::{LedgerError, Result, StoreError, TicketingError};
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - the core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They validate the action, update the state in place, and return effect
/// descriptions for the caller to persist or execute.
pub mod reducer {
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state machine transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The record this reducer mutates
    /// - `Action`: The input driving the transition
    /// - `Environment`: Injected dependencies (clock, code generator)
    /// - `Effect`: Descriptions of work to do once the new state is committed
    /// - `Error`: Why the action was refused
    ///
    /// A refused action leaves the state untouched.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Effect descriptions produced by a successful transition
        type Effect;

        /// Error returned when the action is refused
        type Error;

        /// Reduce an action into state changes and effects
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when the action is not valid for the current
        /// state. The state is not modified in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Effect; 4]>, Self::Error>;
    }
}

/// Environment module - dependency injection traits
///
/// All sources of non-determinism (time, random codes) are abstracted behind
/// traits and injected, so reducers and services stay testable.
pub mod environment {
    use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
    use rand::Rng;

    /// Offset of Western Indonesia Time (UTC+07:00), the venue-local calendar.
    pub const WIB_OFFSET_SECONDS: i32 = 7 * 60 * 60;

    /// Characters used for redemption codes and invoice suffixes.
    ///
    /// Excludes `0`, `O`, `1` and `I` so codes survive being read aloud.
    pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    /// Length of a redemption code.
    pub const REDEMPTION_CODE_LEN: usize = 12;

    /// Length of the random part of an external invoice id.
    pub const INVOICE_SUFFIX_LEN: usize = 6;

    /// The WIB fixed offset.
    #[must_use]
    pub fn wib() -> FixedOffset {
        FixedOffset::east_opt(WIB_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix())
    }

    /// The WIB calendar date of an instant.
    #[must_use]
    pub fn wib_date(instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&wib()).date_naive()
    }

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of opaque codes.
    pub trait CodeGenerator: Send + Sync {
        /// A fresh redemption code for one admission.
        fn redemption_code(&self) -> String;

        /// The random part of an external invoice id.
        fn invoice_suffix(&self) -> String;
    }

    /// Code generator drawing from the thread-local RNG.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RandomCodeGenerator;

    impl RandomCodeGenerator {
        fn random_code(len: usize) -> String {
            let mut rng = rand::thread_rng();
            (0..len)
                .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
                .collect()
        }
    }

    impl CodeGenerator for RandomCodeGenerator {
        fn redemption_code(&self) -> String {
            Self::random_code(REDEMPTION_CODE_LEN)
        }

        fn invoice_suffix(&self) -> String {
            Self::random_code(INVOICE_SUFFIX_LEN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{
        wib_date, CodeGenerator, RandomCodeGenerator, CODE_ALPHABET, REDEMPTION_CODE_LEN,
    };
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn wib_date_rolls_over_at_17_utc() {
        let before = Utc.with_ymd_and_hms(2025, 5, 31, 16, 59, 59).single();
        let after = Utc.with_ymd_and_hms(2025, 5, 31, 17, 0, 0).single();

        assert_eq!(before.map(wib_date), NaiveDate::from_ymd_opt(2025, 5, 31));
        assert_eq!(after.map(wib_date), NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[test]
    fn random_codes_use_the_unambiguous_alphabet() {
        let code = RandomCodeGenerator.redemption_code();
        assert_eq!(code.len(), REDEMPTION_CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }
}
