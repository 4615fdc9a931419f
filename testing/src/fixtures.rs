//! Seeded catalog data.

use crate::store::InMemoryStore;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use matchday_core::types::{
    BuyerSnapshot, Invoice, Member, MemberId, Money, Purchase, PurchaseId, PurchaseStatus, Quota,
    ScheduledMatch, Season, SeasonId, SeasonSnapshot, Series, SeriesId, SeriesSnapshot, Ticket,
    TicketId, TicketSnapshot, Venue, VenueId,
};

/// Unit price of fixture tickets.
pub const TICKET_PRICE: Money = Money::from_rupiah(75_000);

/// Price of one fixture series package.
pub const PACKAGE_PRICE: Money = Money::from_rupiah(200_000);

/// A season with one series, one venue, one member and its tickets.
#[derive(Debug, Clone)]
pub struct CatalogFixture {
    /// The season
    pub season: Season,
    /// The series
    pub series: Series,
    /// The venue every ticket is played at
    pub venue: Venue,
    /// A registered buyer
    pub member: Member,
    /// Tickets, ordered by match date starting 2025-06-01
    pub tickets: Vec<Ticket>,
}

impl CatalogFixture {
    /// One ticket dated 2025-06-01 with `stock` units.
    pub async fn single_day(store: &InMemoryStore, stock: u32) -> Self {
        Self::seed(store, &[stock]).await
    }

    /// One ticket per entry of `stocks`, on consecutive days from 2025-06-01.
    pub async fn seed(store: &InMemoryStore, stocks: &[u32]) -> Self {
        let fixture = Self::build(stocks);

        store.put_season(fixture.season.clone()).await;
        store.put_series(fixture.series.clone()).await;
        store.put_venue(fixture.venue.clone()).await;
        store.put_member(fixture.member.clone()).await;
        for ticket in &fixture.tickets {
            store.put_ticket(ticket.clone()).await;
        }

        fixture
    }

    /// The same data without touching a store.
    #[must_use]
    pub fn build(stocks: &[u32]) -> Self {
        let season = Season {
            id: SeasonId::new(),
            name: "Liga Nusantara 2025".to_string(),
            year: 2025,
        };
        let series = Series {
            id: SeriesId::new(),
            season_id: season.id,
            name: "Opening Weekend".to_string(),
            package_price: PACKAGE_PRICE,
        };
        let venue = Venue {
            id: VenueId::new(),
            name: "Gelora Bung Karno".to_string(),
            city: "Jakarta".to_string(),
        };
        let member = Member {
            id: MemberId::new(),
            name: "Dewi Lestari".to_string(),
            email: "dewi@example.com".to_string(),
            phone: Some("+6281234567890".to_string()),
        };

        let first_day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap_or_default();
        let tickets = stocks
            .iter()
            .zip(first_day.iter_days())
            .enumerate()
            .map(|(n, (&stock, match_date))| Ticket {
                id: TicketId::new(),
                series_id: series.id,
                name: format!("Matchday {}", n + 1),
                match_date,
                venue_id: venue.id,
                price: TICKET_PRICE,
                quota: Quota::new(stock, 0),
                matches: vec![ScheduledMatch {
                    home_team: "Persija".to_string(),
                    away_team: format!("Opponent {}", n + 1),
                    kickoff_at: Utc
                        .from_utc_datetime(&match_date.and_hms_opt(12, 0, 0).unwrap_or_default()),
                }],
            })
            .collect();

        Self {
            season,
            series,
            venue,
            member,
            tickets,
        }
    }

    /// A pending single-ticket purchase of `amount` units of the first ticket,
    /// as if checkout had run at `created_at` with gateway correlation
    /// `external_id`.
    #[must_use]
    pub fn pending_purchase(
        &self,
        amount: u32,
        external_id: &str,
        created_at: DateTime<Utc>,
    ) -> Purchase {
        let tickets: Vec<TicketSnapshot> = self
            .tickets
            .iter()
            .take(1)
            .map(|ticket| TicketSnapshot::capture(ticket, &self.venue))
            .collect();
        let grand_total = TICKET_PRICE.checked_multiply(amount).unwrap_or(TICKET_PRICE);

        Purchase {
            id: PurchaseId::new(),
            buyer: BuyerSnapshot::from(&self.member),
            season: SeasonSnapshot::from(&self.season),
            series: SeriesSnapshot::from(&self.series),
            tickets,
            amount,
            price: TICKET_PRICE,
            grand_total,
            invoice: Invoice {
                external_id: external_id.to_string(),
                gateway_invoice_id: Some(format!("inv_{external_id}")),
                payment_url: Some(format!("https://pay.example.com/{external_id}")),
                ..Invoice::default()
            },
            status: PurchaseStatus::Pending,
            expires_at: Some(created_at + chrono::Duration::hours(24)),
            paid_at: None,
            created_at,
        }
    }
}
