//! Catalog lookups.

use crate::{db, to_u32, to_u64, PostgresStore};
use matchday_core::store::{Catalog, StoreFuture};
use matchday_core::types::{
    Member, MemberId, Money, Quota, ScheduledMatch, Season, SeasonId, Series, SeriesId, Ticket,
    TicketId, Venue, VenueId,
};
use matchday_core::StoreError;
use sqlx::postgres::PgRow;
use sqlx::Row;

const TICKET_COLUMNS: &str =
    "id, series_id, name, match_date, venue_id, price, stock, used, matches";

fn row_to_ticket(row: &PgRow) -> Result<Ticket, StoreError> {
    let matches: serde_json::Value = row.try_get("matches").map_err(db)?;
    let matches: Vec<ScheduledMatch> = serde_json::from_value(matches)?;

    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(db)?),
        series_id: SeriesId::from_uuid(row.try_get("series_id").map_err(db)?),
        name: row.try_get("name").map_err(db)?,
        match_date: row.try_get("match_date").map_err(db)?,
        venue_id: VenueId::from_uuid(row.try_get("venue_id").map_err(db)?),
        price: Money::from_rupiah(to_u64(row.try_get("price").map_err(db)?, "price")?),
        quota: Quota::new(
            to_u32(row.try_get("stock").map_err(db)?, "stock")?,
            to_u32(row.try_get("used").map_err(db)?, "used")?,
        ),
        matches,
    })
}

impl Catalog for PostgresStore {
    fn ticket(&self, id: &TicketId) -> StoreFuture<'_, Option<Ticket>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;

            row.as_ref().map(row_to_ticket).transpose()
        })
    }

    fn tickets_in_series(&self, id: &SeriesId) -> StoreFuture<'_, Vec<Ticket>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE series_id = $1 ORDER BY match_date, id"
            ))
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

            rows.iter().map(row_to_ticket).collect()
        })
    }

    fn series(&self, id: &SeriesId) -> StoreFuture<'_, Option<Series>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, season_id, name, package_price FROM series WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

            row.map(|row| {
                Ok(Series {
                    id: SeriesId::from_uuid(row.try_get("id").map_err(db)?),
                    season_id: SeasonId::from_uuid(row.try_get("season_id").map_err(db)?),
                    name: row.try_get("name").map_err(db)?,
                    package_price: Money::from_rupiah(to_u64(
                        row.try_get("package_price").map_err(db)?,
                        "package_price",
                    )?),
                })
            })
            .transpose()
        })
    }

    fn season(&self, id: &SeasonId) -> StoreFuture<'_, Option<Season>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let row = sqlx::query("SELECT id, name, year FROM seasons WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;

            row.map(|row| {
                Ok(Season {
                    id: SeasonId::from_uuid(row.try_get("id").map_err(db)?),
                    name: row.try_get("name").map_err(db)?,
                    year: row.try_get("year").map_err(db)?,
                })
            })
            .transpose()
        })
    }

    fn venue(&self, id: &VenueId) -> StoreFuture<'_, Option<Venue>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let row = sqlx::query("SELECT id, name, city FROM venues WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;

            row.map(|row| {
                Ok(Venue {
                    id: VenueId::from_uuid(row.try_get("id").map_err(db)?),
                    name: row.try_get("name").map_err(db)?,
                    city: row.try_get("city").map_err(db)?,
                })
            })
            .transpose()
        })
    }

    fn member(&self, id: &MemberId) -> StoreFuture<'_, Option<Member>> {
        let id = *id.as_uuid();
        Box::pin(async move {
            let row = sqlx::query("SELECT id, name, email, phone FROM members WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;

            row.map(|row| {
                Ok(Member {
                    id: MemberId::from_uuid(row.try_get("id").map_err(db)?),
                    name: row.try_get("name").map_err(db)?,
                    email: row.try_get("email").map_err(db)?,
                    phone: row.try_get("phone").map_err(db)?,
                })
            })
            .transpose()
        })
    }
}
