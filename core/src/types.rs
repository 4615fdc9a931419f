//! Domain types for matchday ticket sales.
//!
//! Contains identifiers, the `Money` and `Quota` value objects, catalog records
//! read from the surrounding application, and the purchase records this crate
//! owns. Purchases embed immutable snapshots of catalog data taken at checkout
//! time; later catalog edits never reach them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a dated ticket
    TicketId
);
uuid_id!(
    /// Unique identifier for a series (a bundle of match days)
    SeriesId
);
uuid_id!(
    /// Unique identifier for a season
    SeasonId
);
uuid_id!(
    /// Unique identifier for a venue
    VenueId
);
uuid_id!(
    /// Unique identifier for a member (buyer)
    MemberId
);
uuid_id!(
    /// Unique identifier for a purchase
    PurchaseId
);
uuid_id!(
    /// Unique identifier for a redeemable ticket unit
    TicketPurchaseId
);
uuid_id!(
    /// Unique identifier for an outbox entry
    OutboxEntryId
);

// ============================================================================
// Money
// ============================================================================

/// An amount in whole rupiah.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero rupiah.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from whole rupiah
    #[must_use]
    pub const fn from_rupiah(rupiah: u64) -> Self {
        Self(rupiah)
    }

    /// Returns the amount in rupiah
    #[must_use]
    pub const fn rupiah(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IDR {}", self.0)
    }
}

// ============================================================================
// Quota
// ============================================================================

/// Stock accounting for one ticket.
///
/// `remaining` is derived on every read and never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Total sellable units
    pub stock: u32,
    /// Units debited by reservations
    pub used: u32,
}

impl Quota {
    /// Creates a quota
    #[must_use]
    pub const fn new(stock: u32, used: u32) -> Self {
        Self { stock, used }
    }

    /// Units still available: `stock - used`
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.stock.saturating_sub(self.used)
    }

    /// Whether `amount` units can be debited
    #[must_use]
    pub const fn covers(&self, amount: u32) -> bool {
        self.remaining() >= amount
    }

    /// Quota after debiting `amount`, or `None` if it would oversell
    #[must_use]
    pub const fn debited(self, amount: u32) -> Option<Self> {
        if !self.covers(amount) {
            return None;
        }
        Some(Self {
            stock: self.stock,
            used: self.used + amount,
        })
    }

    /// Quota after crediting `amount` back; `used` never drops below zero
    #[must_use]
    pub const fn credited(self, amount: u32) -> Self {
        Self {
            stock: self.stock,
            used: self.used.saturating_sub(amount),
        }
    }
}

// ============================================================================
// Catalog records (read-only here)
// ============================================================================

/// One scheduled fixture covered by a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMatch {
    /// Home team display name
    pub home_team: String,
    /// Away team display name
    pub away_team: String,
    /// Kick-off time
    pub kickoff_at: DateTime<Utc>,
}

/// A dated sellable ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Owning series
    pub series_id: SeriesId,
    /// Display name
    pub name: String,
    /// Match day, as a WIB calendar date
    pub match_date: NaiveDate,
    /// Where the matches are played
    pub venue_id: VenueId,
    /// Unit price
    pub price: Money,
    /// Stock counters
    pub quota: Quota,
    /// Fixtures on this day
    pub matches: Vec<ScheduledMatch>,
}

/// A bundle of tickets sold together as a package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    /// Series ID
    pub id: SeriesId,
    /// Owning season
    pub season_id: SeasonId,
    /// Display name
    pub name: String,
    /// Price of one package (one admission to every ticket in the series)
    pub package_price: Money,
}

/// A competition season.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    /// Season ID
    pub id: SeasonId,
    /// Display name
    pub name: String,
    /// Calendar year the season starts in
    pub year: i32,
}

/// A stadium.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    /// Venue ID
    pub id: VenueId,
    /// Display name
    pub name: String,
    /// City
    pub city: String,
}

/// A registered buyer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member ID
    pub id: MemberId,
    /// Full name
    pub name: String,
    /// Email address (redemption codes are sent here)
    pub email: String,
    /// Mobile number, if known
    pub phone: Option<String>,
}

/// What a buyer is checking out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Product {
    /// A single match day
    Ticket(TicketId),
    /// Every ticket of a series, at the package price
    Series(SeriesId),
}

// ============================================================================
// Snapshots
// ============================================================================

/// Buyer details frozen at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerSnapshot {
    /// Member ID
    pub member_id: MemberId,
    /// Name at checkout
    pub name: String,
    /// Email at checkout
    pub email: String,
    /// Phone at checkout
    pub phone: Option<String>,
}

impl From<&Member> for BuyerSnapshot {
    fn from(member: &Member) -> Self {
        Self {
            member_id: member.id,
            name: member.name.clone(),
            email: member.email.clone(),
            phone: member.phone.clone(),
        }
    }
}

/// Season details frozen at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonSnapshot {
    /// Season ID
    pub season_id: SeasonId,
    /// Name at checkout
    pub name: String,
    /// Year at checkout
    pub year: i32,
}

impl From<&Season> for SeasonSnapshot {
    fn from(season: &Season) -> Self {
        Self {
            season_id: season.id,
            name: season.name.clone(),
            year: season.year,
        }
    }
}

/// Series details frozen at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    /// Series ID
    pub series_id: SeriesId,
    /// Name at checkout
    pub name: String,
}

impl From<&Series> for SeriesSnapshot {
    fn from(series: &Series) -> Self {
        Self {
            series_id: series.id,
            name: series.name.clone(),
        }
    }
}

/// Venue details frozen at checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueSnapshot {
    /// Venue ID
    pub venue_id: VenueId,
    /// Name at checkout
    pub name: String,
    /// City at checkout
    pub city: String,
}

impl From<&Venue> for VenueSnapshot {
    fn from(venue: &Venue) -> Self {
        Self {
            venue_id: venue.id,
            name: venue.name.clone(),
            city: venue.city.clone(),
        }
    }
}

/// Ticket details frozen at checkout. One per ticket line of a purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    /// Ticket ID
    pub ticket_id: TicketId,
    /// Name at checkout
    pub name: String,
    /// Match day (WIB)
    pub match_date: NaiveDate,
    /// Ticket price at checkout
    pub price: Money,
    /// Venue at checkout
    pub venue: VenueSnapshot,
    /// Fixtures at checkout
    pub matches: Vec<ScheduledMatch>,
}

impl TicketSnapshot {
    /// Snapshot a ticket together with its venue.
    #[must_use]
    pub fn capture(ticket: &Ticket, venue: &Venue) -> Self {
        Self {
            ticket_id: ticket.id,
            name: ticket.name.clone(),
            match_date: ticket.match_date,
            price: ticket.price,
            venue: VenueSnapshot::from(venue),
            matches: ticket.matches.clone(),
        }
    }
}

// ============================================================================
// Purchase
// ============================================================================

/// Purchase lifecycle status.
///
/// `Pending` moves to exactly one of the terminal states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Waiting for the payment gateway
    Pending,
    /// Payment confirmed, units issued
    Paid,
    /// Payment failed or expired, inventory credited back
    Failed,
}

impl PurchaseStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further transition is allowed
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment gateway correlation data embedded in a purchase.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Locally generated correlation id sent to the gateway
    pub external_id: String,
    /// Invoice id assigned by the gateway (absent for free tickets)
    pub gateway_invoice_id: Option<String>,
    /// Hosted payment page
    pub payment_url: Option<String>,
    /// Merchant name shown by the gateway
    pub merchant_name: Option<String>,
    /// Payment method reported on settlement
    pub payment_method: Option<String>,
    /// Bank code reported on settlement
    pub bank_code: Option<String>,
    /// Payment channel reported on settlement
    pub payment_channel: Option<String>,
    /// Payment destination (virtual account, etc.) reported on settlement
    pub payment_destination: Option<String>,
}

/// One buyer's checkout of one product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Purchase ID
    pub id: PurchaseId,
    /// Buyer at checkout
    pub buyer: BuyerSnapshot,
    /// Season at checkout
    pub season: SeasonSnapshot,
    /// Series at checkout
    pub series: SeriesSnapshot,
    /// Ticket lines; never empty
    pub tickets: Vec<TicketSnapshot>,
    /// Units per ticket line
    pub amount: u32,
    /// Unit price (ticket price, or package price for a series)
    pub price: Money,
    /// `price × amount`
    pub grand_total: Money,
    /// Gateway correlation
    pub invoice: Invoice,
    /// Lifecycle status
    pub status: PurchaseStatus,
    /// When the payment link stops working
    pub expires_at: Option<DateTime<Utc>>,
    /// When the gateway reported payment
    pub paid_at: Option<DateTime<Utc>>,
    /// When the purchase was created
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    /// Number of redeemable units a paid purchase issues.
    #[must_use]
    pub fn expected_units(&self) -> usize {
        self.tickets.len() * self.amount as usize
    }
}

/// One redeemable admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPurchase {
    /// Unit ID
    pub id: TicketPurchaseId,
    /// Purchase that issued this unit
    pub purchase_id: PurchaseId,
    /// Buyer at checkout
    pub buyer: BuyerSnapshot,
    /// Ticket at checkout
    pub ticket: TicketSnapshot,
    /// Venue at checkout
    pub venue: VenueSnapshot,
    /// Globally unique opaque code presented at the gate
    pub code: String,
    /// Whether the unit has been redeemed
    pub is_used: bool,
    /// When the unit was redeemed
    pub used_at: Option<DateTime<Utc>>,
    /// When the unit was issued
    pub created_at: DateTime<Utc>,
}
