//! Redeemable units.

use crate::{db, PostgresStore};
use chrono::{DateTime, Utc};
use matchday_core::store::{CommitOutcome, StoreFuture, TicketPurchaseStore};
use matchday_core::types::{PurchaseId, TicketPurchase, TicketPurchaseId};
use matchday_core::StoreError;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};

const UNIT_COLUMNS: &str =
    "id, purchase_id, code, is_used, used_at, buyer, ticket, venue, created_at";

fn row_to_unit(row: &PgRow) -> Result<TicketPurchase, StoreError> {
    let buyer: serde_json::Value = row.try_get("buyer").map_err(db)?;
    let ticket: serde_json::Value = row.try_get("ticket").map_err(db)?;
    let venue: serde_json::Value = row.try_get("venue").map_err(db)?;

    Ok(TicketPurchase {
        id: TicketPurchaseId::from_uuid(row.try_get("id").map_err(db)?),
        purchase_id: PurchaseId::from_uuid(row.try_get("purchase_id").map_err(db)?),
        buyer: serde_json::from_value(buyer)?,
        ticket: serde_json::from_value(ticket)?,
        venue: serde_json::from_value(venue)?,
        code: row.try_get("code").map_err(db)?,
        is_used: row.try_get("is_used").map_err(db)?,
        used_at: row.try_get("used_at").map_err(db)?,
        created_at: row.try_get("created_at").map_err(db)?,
    })
}

/// Bulk-insert units inside a settlement transaction.
pub(crate) async fn insert_units(
    tx: &mut Transaction<'_, Postgres>,
    units: &[TicketPurchase],
) -> Result<(), StoreError> {
    for unit in units {
        sqlx::query(
            r"
            INSERT INTO ticket_purchases (
                id, purchase_id, code, is_used, used_at, buyer, ticket, venue, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(unit.id.as_uuid())
        .bind(unit.purchase_id.as_uuid())
        .bind(&unit.code)
        .bind(unit.is_used)
        .bind(unit.used_at)
        .bind(serde_json::to_value(&unit.buyer)?)
        .bind(serde_json::to_value(&unit.ticket)?)
        .bind(serde_json::to_value(&unit.venue)?)
        .bind(unit.created_at)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
    }

    Ok(())
}

impl TicketPurchaseStore for PostgresStore {
    fn unit_by_code<'a>(&'a self, code: &'a str) -> StoreFuture<'a, Option<TicketPurchase>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {UNIT_COLUMNS} FROM ticket_purchases WHERE code = $1"
            ))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

            row.as_ref().map(row_to_unit).transpose()
        })
    }

    fn units_for_purchase(
        &self,
        purchase_id: &PurchaseId,
    ) -> StoreFuture<'_, Vec<TicketPurchase>> {
        let purchase_id = *purchase_id.as_uuid();
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {UNIT_COLUMNS} FROM ticket_purchases \
                 WHERE purchase_id = $1 ORDER BY created_at, code"
            ))
            .bind(purchase_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

            rows.iter().map(row_to_unit).collect()
        })
    }

    fn mark_used(
        &self,
        id: &TicketPurchaseId,
        used_at: DateTime<Utc>,
    ) -> StoreFuture<'_, CommitOutcome> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE ticket_purchases
                SET is_used = TRUE, used_at = $2
                WHERE id = $1 AND is_used = FALSE
                ",
            )
            .bind(id)
            .bind(used_at)
            .execute(&self.pool)
            .await
            .map_err(db)?;

            Ok(if result.rows_affected() == 1 {
                CommitOutcome::Committed
            } else {
                CommitOutcome::Stale
            })
        })
    }
}
