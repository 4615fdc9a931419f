//! Inventory ledger.
//!
//! `debit` and `credit` are single `UPDATE` statements; Postgres row locks
//! serialize concurrent calls on the same ticket, and the `WHERE` guard keeps
//! `used <= stock` without a read-modify-write round trip.
//!
//! `credit_once` wraps the credit in a transaction with an insert into
//! `inventory_credits`, whose primary key is the requesting outbox entry.

use crate::{db, to_i32, to_u32, PostgresStore};
use matchday_core::error::LedgerError;
use matchday_core::store::{CreditOutcome, InventoryLedger, LedgerFuture};
use matchday_core::types::{OutboxEntryId, Quota, TicketId};
use matchday_core::StoreError;
use sqlx::postgres::PgRow;
use sqlx::Row;

fn row_to_quota(row: &PgRow) -> Result<Quota, StoreError> {
    Ok(Quota::new(
        to_u32(row.try_get("stock").map_err(db)?, "stock")?,
        to_u32(row.try_get("used").map_err(db)?, "used")?,
    ))
}

impl PostgresStore {
    async fn current_quota(&self, ticket_id: TicketId) -> Result<Quota, LedgerError> {
        let row = sqlx::query("SELECT stock, used FROM tickets WHERE id = $1")
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .ok_or(LedgerError::UnknownTicket(ticket_id))?;

        Ok(row_to_quota(&row)?)
    }
}

impl InventoryLedger for PostgresStore {
    fn remaining(&self, ticket_id: &TicketId) -> LedgerFuture<'_, Quota> {
        let ticket_id = *ticket_id;
        Box::pin(async move { self.current_quota(ticket_id).await })
    }

    fn debit(&self, ticket_id: &TicketId, amount: u32) -> LedgerFuture<'_, Quota> {
        let ticket_id = *ticket_id;
        Box::pin(async move {
            let delta = to_i32(amount, "amount")?;
            let row = sqlx::query(
                r"
                UPDATE tickets
                SET used = used + $2
                WHERE id = $1 AND stock - used >= $2
                RETURNING stock, used
                ",
            )
            .bind(ticket_id.as_uuid())
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

            if let Some(row) = row {
                let quota = row_to_quota(&row)?;
                tracing::debug!(%ticket_id, amount, remaining = quota.remaining(), "Inventory debited");
                return Ok(quota);
            }

            // Nothing updated: either the ticket is missing or stock ran out
            let quota = self.current_quota(ticket_id).await?;
            Err(LedgerError::Insufficient {
                ticket_id,
                requested: amount,
                remaining: quota.remaining(),
            })
        })
    }

    fn credit(&self, ticket_id: &TicketId, amount: u32) -> LedgerFuture<'_, Quota> {
        let ticket_id = *ticket_id;
        Box::pin(async move {
            let delta = to_i32(amount, "amount")?;
            let row = sqlx::query(
                r"
                UPDATE tickets
                SET used = GREATEST(used - $2, 0)
                WHERE id = $1
                RETURNING stock, used
                ",
            )
            .bind(ticket_id.as_uuid())
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .ok_or(LedgerError::UnknownTicket(ticket_id))?;

            let quota = row_to_quota(&row)?;
            tracing::debug!(%ticket_id, amount, remaining = quota.remaining(), "Inventory credited");
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
            let delta = to_i32(amount, "amount")?;
            let mut tx = self.pool.begin().await.map_err(db)?;

            // Blocks on a concurrent delivery of the same key until it commits
            let recorded = sqlx::query(
                r"
                INSERT INTO inventory_credits (outbox_id, ticket_id, amount)
                SELECT $1, id, $3 FROM tickets WHERE id = $2
                ON CONFLICT (outbox_id) DO NOTHING
                ",
            )
            .bind(key.as_uuid())
            .bind(ticket_id.as_uuid())
            .bind(delta)
            .execute(&mut *tx)
            .await
            .map_err(db)?
            .rows_affected();

            if recorded == 0 {
                let seen = sqlx::query("SELECT 1 FROM inventory_credits WHERE outbox_id = $1")
                    .bind(key.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db)?;
                tx.rollback().await.map_err(db)?;
                return match seen {
                    Some(_) => {
                        tracing::debug!(outbox_id = %key, %ticket_id, "Inventory credit already applied");
                        Ok(CreditOutcome::AlreadyApplied)
                    }
                    None => Err(LedgerError::UnknownTicket(*ticket_id)),
                };
            }

            let row = sqlx::query(
                r"
                UPDATE tickets
                SET used = GREATEST(used - $2, 0)
                WHERE id = $1
                RETURNING stock, used
                ",
            )
            .bind(ticket_id.as_uuid())
            .bind(delta)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?
            .ok_or(LedgerError::UnknownTicket(*ticket_id))?;

            let quota = row_to_quota(&row)?;
            tx.commit().await.map_err(db)?;
            tracing::debug!(outbox_id = %key, %ticket_id, amount, remaining = quota.remaining(), "Inventory credited");
            Ok(CreditOutcome::Applied(quota))
        })
    }
}
