//! `PostgreSQL` storage for matchday ticket sales.
//!
//! [`PostgresStore`] implements every storage trait from `matchday-core`:
//!
//! - `Catalog`: read-only lookups into the catalog tables
//! - `InventoryLedger`: single-statement conditional updates on `tickets.used`,
//!   plus keyed credits guarded by `inventory_credits`
//! - `PurchaseStore` / `TicketPurchaseStore`: purchases, units and their
//!   guarded transitions, each in one transaction
//! - `OutboxStore`: the durable intent queue, claimed with `SKIP LOCKED`
//!
//! Snapshots are stored as `JSONB` and never joined back to catalog rows.
//!
//! # Example
//!
//! ```ignore
//! use matchday_postgres::{PoolSettings, PostgresStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::connect("postgres://localhost/matchday", &PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod ledger;
mod outbox;
mod purchases;
mod units;

use matchday_core::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections in the pool
    pub min_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// `PostgreSQL`-backed store.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with the given pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot connect.
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect(url)
            .await
            .map_err(db)?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Round-trip a trivial query (readiness probe).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database does not answer.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db)
    }
}

// ============================================================================
// Column conversions
// ============================================================================

#[allow(clippy::needless_pass_by_value)] // Used as `map_err(db)`
pub(crate) fn db(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
}

pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {column}: {value}")))
}

pub(crate) fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("{column} out of range: {value}")))
}

pub(crate) fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {column}: {value}")))
}
