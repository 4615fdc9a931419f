//! # Matchday Testing
//!
//! Test doubles for the matchday ticketing services.
//!
//! This crate provides:
//! - Deterministic environment implementations (`FixedClock`,
//!   `SequentialCodeGenerator`)
//! - `InMemoryStore`, implementing every storage trait with failure injection
//! - `MockPaymentGateway` and `RecordingMailer`
//! - `CatalogFixture`, a seeded season/series/venue/member/tickets catalog
//!
//! ## Example
//!
//! ```ignore
//! use matchday_testing::{wib_clock, CatalogFixture, InMemoryStore};
//!
//! #[tokio::test]
//! async fn sells_a_ticket() {
//!     let store = InMemoryStore::new();
//!     let catalog = CatalogFixture::single_day(&store, 10).await;
//!     let clock = wib_clock(2025, 6, 1, 9, 0);
//!     // build services over `store` and `clock`...
//! }
//! ```

pub mod fixtures;
pub mod gateway;
pub mod mailer;
pub mod store;

use chrono::{DateTime, Utc};
use matchday_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::{Duration, FixedOffset, TimeZone};
    use matchday_core::environment::{CodeGenerator, WIB_OFFSET_SECONDS};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::set`] or
    /// [`FixedClock::advance`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use matchday_testing::mocks::FixedClock;
    /// use matchday_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// assert_eq!(before, clock.now());
    ///
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now() - before, Duration::minutes(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            match self.time.write() {
                Ok(mut guard) => *guard = time,
                Err(poisoned) => *poisoned.into_inner() = time,
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let now = self.now();
            self.set(now + by);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            match self.time.read() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    /// Create a default fixed clock for tests (2025-06-01 09:00 WIB)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        wib_clock(2025, 6, 1, 9, 0)
    }

    /// A fixed clock at a WIB wall-clock time.
    ///
    /// # Panics
    ///
    /// Panics if the date or time is out of range.
    #[must_use]
    #[allow(clippy::expect_used)] // Test helper: a bad literal is a test bug
    pub fn wib_clock(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> FixedClock {
        let wib = FixedOffset::east_opt(WIB_OFFSET_SECONDS).expect("WIB offset is in range");
        let local = wib
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .expect("valid WIB timestamp");
        FixedClock::new(local.with_timezone(&Utc))
    }

    /// Predictable code generator.
    ///
    /// Redemption codes are `RC` followed by a zero-padded counter
    /// (`RC0000000001`); invoice suffixes are `SFX` plus a counter (`SFX001`).
    #[derive(Debug, Default)]
    pub struct SequentialCodeGenerator {
        codes: AtomicU64,
        suffixes: AtomicU64,
    }

    impl SequentialCodeGenerator {
        /// Creates a new generator starting at 1
        #[must_use]
        pub const fn new() -> Self {
            Self {
                codes: AtomicU64::new(0),
                suffixes: AtomicU64::new(0),
            }
        }
    }

    impl CodeGenerator for SequentialCodeGenerator {
        fn redemption_code(&self) -> String {
            let n = self.codes.fetch_add(1, Ordering::SeqCst) + 1;
            format!("RC{n:010}")
        }

        fn invoice_suffix(&self) -> String {
            let n = self.suffixes.fetch_add(1, Ordering::SeqCst) + 1;
            format!("SFX{n:03}")
        }
    }
}

// Re-export commonly used items
pub use fixtures::CatalogFixture;
pub use gateway::MockPaymentGateway;
pub use mailer::RecordingMailer;
pub use mocks::{test_clock, wib_clock, FixedClock, SequentialCodeGenerator};
pub use store::{Fault, InMemoryStore};

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_core::environment::{wib_date, CodeGenerator};

    #[test]
    fn test_clock_is_on_the_first_of_june_in_wib() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(
            wib_date(clock.now()),
            chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default()
        );
    }

    #[test]
    fn sequential_codes_never_repeat() {
        let codes = SequentialCodeGenerator::new();
        assert_eq!(codes.redemption_code(), "RC0000000001");
        assert_eq!(codes.redemption_code(), "RC0000000002");
        assert_eq!(codes.invoice_suffix(), "SFX001");
    }
}
