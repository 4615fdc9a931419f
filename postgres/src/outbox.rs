//! Durable outbox.
//!
//! Entries are written by purchase transitions (see `purchases.rs`) or by
//! [`OutboxStore::enqueue`], and drained by the runtime's outbox worker.
//! Entries whose retry budget runs out stay in the table with
//! `dead_lettered_at` set; the server reports their count at startup.

use crate::{db, to_i32, to_u32, PostgresStore};
use chrono::{DateTime, Utc};
use matchday_core::intent::OutboxEntry;
use matchday_core::store::{OutboxStore, StoreFuture};
use matchday_core::types::OutboxEntryId;
use matchday_core::StoreError;
use sqlx::postgres::PgRow;
use sqlx::{Executor, Postgres, Row, Transaction};

const ENTRY_COLUMNS: &str = "id, intent, attempts, next_attempt_at, last_error, created_at";

fn row_to_entry(row: &PgRow) -> Result<OutboxEntry, StoreError> {
    let intent: serde_json::Value = row.try_get("intent").map_err(db)?;

    Ok(OutboxEntry {
        id: OutboxEntryId::from_uuid(row.try_get("id").map_err(db)?),
        intent: serde_json::from_value(intent)?,
        attempts: to_u32(row.try_get("attempts").map_err(db)?, "attempts")?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(db)?,
        last_error: row.try_get("last_error").map_err(db)?,
        created_at: row.try_get("created_at").map_err(db)?,
    })
}

async fn insert_entry<'e, E>(executor: E, entry: &OutboxEntry) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r"
        INSERT INTO outbox (
            id, kind, purchase_id, intent, attempts, next_attempt_at, last_error, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.intent.kind())
    .bind(entry.intent.purchase_id().as_uuid())
    .bind(serde_json::to_value(&entry.intent)?)
    .bind(to_i32(entry.attempts, "attempts")?)
    .bind(entry.next_attempt_at)
    .bind(entry.last_error.as_deref())
    .bind(entry.created_at)
    .execute(executor)
    .await
    .map_err(db)?;

    Ok(())
}

/// Insert entries as part of a purchase transition.
pub(crate) async fn insert_entries(
    tx: &mut Transaction<'_, Postgres>,
    entries: &[OutboxEntry],
) -> Result<(), StoreError> {
    for entry in entries {
        insert_entry(&mut **tx, entry).await?;
    }
    Ok(())
}

impl PostgresStore {
    /// Number of dead-lettered entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_dead_letters(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM outbox WHERE dead_lettered_at IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(db)?;

        crate::to_u64(count, "count")
    }
}

impl OutboxStore for PostgresStore {
    fn enqueue<'a>(&'a self, entry: &'a OutboxEntry) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            insert_entry(&self.pool, entry).await?;
            tracing::debug!(
                outbox_id = %entry.id,
                kind = entry.intent.kind(),
                "Outbox entry enqueued"
            );
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
            // The CTE snapshots each row before the lease is written, so the
            // worker sees the original schedule
            let rows = sqlx::query(&format!(
                "WITH claimed AS ( \
                     SELECT {ENTRY_COLUMNS} FROM outbox \
                     WHERE completed_at IS NULL AND dead_lettered_at IS NULL \
                     AND next_attempt_at <= $1 \
                     ORDER BY next_attempt_at ASC, created_at ASC \
                     LIMIT $3 \
                     FOR UPDATE SKIP LOCKED \
                 ), leased AS ( \
                     UPDATE outbox SET next_attempt_at = $2 \
                     FROM claimed WHERE outbox.id = claimed.id \
                 ) \
                 SELECT {ENTRY_COLUMNS} FROM claimed \
                 ORDER BY next_attempt_at ASC, created_at ASC"
            ))
            .bind(now)
            .bind(lease_until)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

            rows.iter().map(row_to_entry).collect()
        })
    }

    fn complete(&self, id: &OutboxEntryId, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        let id = *id.as_uuid();
        Box::pin(async move {
            sqlx::query("UPDATE outbox SET completed_at = $2 WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await
                .map_err(db)?;
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
            sqlx::query(
                r"
                UPDATE outbox
                SET attempts = attempts + 1, next_attempt_at = $2, last_error = $3
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .bind(next_attempt_at)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(db)?;
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
            sqlx::query(
                r"
                UPDATE outbox
                SET attempts = attempts + 1, dead_lettered_at = $2, last_error = $3
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .bind(at)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(db)?;

            tracing::warn!(outbox_id = %id, error, "Outbox entry dead-lettered");
            Ok(())
        })
    }
}

