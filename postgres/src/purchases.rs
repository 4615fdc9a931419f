//! Purchases and their settlement transitions.

use crate::outbox::insert_entries;
use crate::units::insert_units;
use crate::{db, to_i32, to_i64, to_u32, to_u64, PostgresStore};
use chrono::{DateTime, Utc};
use matchday_core::intent::OutboxEntry;
use matchday_core::store::{CommitOutcome, PurchaseStore, StoreFuture};
use matchday_core::types::{Money, Purchase, PurchaseId, PurchaseStatus, TicketPurchase};
use matchday_core::StoreError;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};

const PURCHASE_COLUMNS: &str = "id, status, amount, price, grand_total, buyer, season, series, \
     tickets, invoice, expires_at, paid_at, created_at";

fn json<T: serde::de::DeserializeOwned>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let value: serde_json::Value = row.try_get(column).map_err(db)?;
    Ok(serde_json::from_value(value)?)
}

fn row_to_purchase(row: &PgRow) -> Result<Purchase, StoreError> {
    let status: String = row.try_get("status").map_err(db)?;
    let status = PurchaseStatus::parse(&status)
        .ok_or_else(|| StoreError::Serialization(format!("Invalid purchase status: {status}")))?;

    Ok(Purchase {
        id: PurchaseId::from_uuid(row.try_get("id").map_err(db)?),
        buyer: json(row, "buyer")?,
        season: json(row, "season")?,
        series: json(row, "series")?,
        tickets: json(row, "tickets")?,
        amount: to_u32(row.try_get("amount").map_err(db)?, "amount")?,
        price: Money::from_rupiah(to_u64(row.try_get("price").map_err(db)?, "price")?),
        grand_total: Money::from_rupiah(to_u64(
            row.try_get("grand_total").map_err(db)?,
            "grand_total",
        )?),
        invoice: json(row, "invoice")?,
        status,
        expires_at: row.try_get("expires_at").map_err(db)?,
        paid_at: row.try_get("paid_at").map_err(db)?,
        created_at: row.try_get("created_at").map_err(db)?,
    })
}

/// Write the terminal state of `purchase`, only if the row is still pending.
async fn transition(
    tx: &mut Transaction<'_, Postgres>,
    purchase: &Purchase,
) -> Result<CommitOutcome, StoreError> {
    let result = sqlx::query(
        r"
        UPDATE purchases
        SET status = $2, invoice = $3, paid_at = $4
        WHERE id = $1 AND status = 'pending'
        ",
    )
    .bind(purchase.id.as_uuid())
    .bind(purchase.status.as_str())
    .bind(serde_json::to_value(&purchase.invoice)?)
    .bind(purchase.paid_at)
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    Ok(if result.rows_affected() == 1 {
        CommitOutcome::Committed
    } else {
        CommitOutcome::Stale
    })
}

impl PurchaseStore for PostgresStore {
    fn insert_purchase<'a>(&'a self, purchase: &'a Purchase) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO purchases (
                    id, external_id, gateway_invoice_id, status, buyer_id, amount, price,
                    grand_total, buyer, season, series, tickets, invoice, expires_at, paid_at,
                    created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ",
            )
            .bind(purchase.id.as_uuid())
            .bind(&purchase.invoice.external_id)
            .bind(purchase.invoice.gateway_invoice_id.as_deref())
            .bind(purchase.status.as_str())
            .bind(purchase.buyer.member_id.as_uuid())
            .bind(to_i32(purchase.amount, "amount")?)
            .bind(to_i64(purchase.price.rupiah(), "price")?)
            .bind(to_i64(purchase.grand_total.rupiah(), "grand_total")?)
            .bind(serde_json::to_value(&purchase.buyer)?)
            .bind(serde_json::to_value(&purchase.season)?)
            .bind(serde_json::to_value(&purchase.series)?)
            .bind(serde_json::to_value(&purchase.tickets)?)
            .bind(serde_json::to_value(&purchase.invoice)?)
            .bind(purchase.expires_at)
            .bind(purchase.paid_at)
            .bind(purchase.created_at)
            .execute(&self.pool)
            .await
            .map_err(db)?;

            Ok(())
        })
    }

    fn purchase(&self, id: &PurchaseId) -> StoreFuture<'_, Option<Purchase>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

            row.as_ref().map(row_to_purchase).transpose()
        })
    }

    fn find_by_invoice<'a>(
        &'a self,
        gateway_invoice_id: &'a str,
        external_id: &'a str,
    ) -> StoreFuture<'a, Option<Purchase>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases \
                 WHERE gateway_invoice_id = $1 AND external_id = $2"
            ))
            .bind(gateway_invoice_id)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

            row.as_ref().map(row_to_purchase).transpose()
        })
    }

    fn count_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM purchases WHERE created_at >= $1 AND created_at < $2",
            )
            .bind(from)
            .bind(to)
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;

            to_u64(count, "count")
        })
    }

    fn commit_paid<'a>(
        &'a self,
        purchase: &'a Purchase,
        units: &'a [TicketPurchase],
        outbox: &'a [OutboxEntry],
    ) -> StoreFuture<'a, CommitOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db)?;

            if transition(&mut tx, purchase).await? == CommitOutcome::Stale {
                tx.rollback().await.map_err(db)?;
                return Ok(CommitOutcome::Stale);
            }

            insert_units(&mut tx, units).await?;
            insert_entries(&mut tx, outbox).await?;
            tx.commit().await.map_err(db)?;

            Ok(CommitOutcome::Committed)
        })
    }

    fn commit_failed<'a>(
        &'a self,
        purchase: &'a Purchase,
        outbox: &'a [OutboxEntry],
    ) -> StoreFuture<'a, CommitOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db)?;

            if transition(&mut tx, purchase).await? == CommitOutcome::Stale {
                tx.rollback().await.map_err(db)?;
                return Ok(CommitOutcome::Stale);
            }

            insert_entries(&mut tx, outbox).await?;
            tx.commit().await.map_err(db)?;

            Ok(CommitOutcome::Committed)
        })
    }

    fn paid_without_units(&self) -> StoreFuture<'_, Vec<Purchase>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {PURCHASE_COLUMNS} FROM purchases p \
                 WHERE p.status = 'paid' \
                 AND NOT EXISTS (SELECT 1 FROM ticket_purchases u WHERE u.purchase_id = p.id) \
                 ORDER BY p.created_at"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

            rows.iter().map(row_to_purchase).collect()
        })
    }
}
