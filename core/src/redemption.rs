//! Redemption state machine.
//!
//! A unit is redeemable once, and only on its match day as seen from the
//! venue's calendar (WIB).

use crate::environment::{wib_date, Clock};
use crate::error::TicketingError;
use crate::reducer::Reducer;
use crate::types::TicketPurchase;
use smallvec::SmallVec;
use std::convert::Infallible;
use std::sync::Arc;

/// Redemption action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedemptionAction {
    /// Admit the holder at the gate.
    Redeem,
}

/// Injected dependencies for redemption.
#[derive(Clone)]
pub struct RedemptionEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl RedemptionEnvironment {
    /// Creates a new `RedemptionEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Pure `unused → used` transition.
///
/// Day check comes first: a stale code presented on the wrong day reports
/// `WrongDay` whether or not it was already used.
#[derive(Clone, Debug, Default)]
pub struct RedemptionReducer;

impl RedemptionReducer {
    /// Creates a new `RedemptionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for RedemptionReducer {
    type State = TicketPurchase;
    type Action = RedemptionAction;
    type Environment = RedemptionEnvironment;
    type Effect = Infallible;
    type Error = TicketingError;

    fn reduce(
        &self,
        unit: &mut TicketPurchase,
        action: RedemptionAction,
        env: &RedemptionEnvironment,
    ) -> Result<SmallVec<[Infallible; 4]>, TicketingError> {
        match action {
            RedemptionAction::Redeem => {
                let now = env.clock.now();
                let today = wib_date(now);

                if unit.ticket.match_date != today {
                    return Err(TicketingError::WrongDay {
                        scheduled: unit.ticket.match_date,
                        today,
                    });
                }

                if unit.is_used {
                    return Err(TicketingError::conflict(format!(
                        "code {} was already redeemed",
                        unit.code
                    )));
                }

                unit.is_used = true;
                unit.used_at = Some(now);
                Ok(SmallVec::new())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{
        BuyerSnapshot, MemberId, Money, PurchaseId, TicketId, TicketPurchaseId, TicketSnapshot,
        VenueId, VenueSnapshot,
    };
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    struct At(DateTime<Utc>);

    impl Clock for At {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn env_at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> RedemptionEnvironment {
        let instant = Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap();
        RedemptionEnvironment::new(Arc::new(At(instant)))
    }

    fn unit_for(match_date: NaiveDate) -> TicketPurchase {
        let venue = VenueSnapshot {
            venue_id: VenueId::new(),
            name: "Gelora".to_string(),
            city: "Jakarta".to_string(),
        };
        TicketPurchase {
            id: TicketPurchaseId::new(),
            purchase_id: PurchaseId::new(),
            buyer: BuyerSnapshot {
                member_id: MemberId::new(),
                name: "Budi".to_string(),
                email: "budi@example.com".to_string(),
                phone: None,
            },
            ticket: TicketSnapshot {
                ticket_id: TicketId::new(),
                name: "Matchday 1".to_string(),
                match_date,
                price: Money::from_rupiah(50_000),
                venue: venue.clone(),
                matches: vec![],
            },
            venue,
            code: "ABCDEFGHJKLM".to_string(),
            is_used: false,
            used_at: None,
            created_at: Utc::now(),
        }
    }

    fn june_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn redeems_on_the_wib_match_day() {
        // 31 May 17:30 UTC is 1 June 00:30 WIB
        let env = env_at(2025, 5, 31, 17, 30);
        let mut unit = unit_for(june_first());

        RedemptionReducer::new()
            .reduce(&mut unit, RedemptionAction::Redeem, &env)
            .unwrap();

        assert!(unit.is_used);
        assert_eq!(unit.used_at, Some(env.clock.now()));
    }

    #[test]
    fn utc_date_alone_is_not_enough() {
        // 1 June 18:00 UTC is already 2 June in WIB
        let env = env_at(2025, 6, 1, 18, 0);
        let mut unit = unit_for(june_first());

        let err = RedemptionReducer::new()
            .reduce(&mut unit, RedemptionAction::Redeem, &env)
            .unwrap_err();

        assert!(matches!(
            err,
            TicketingError::WrongDay { scheduled, today }
                if scheduled == june_first() && today == NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        ));
        assert!(!unit.is_used);
    }

    #[test]
    fn second_redemption_is_a_conflict_and_keeps_used_at() {
        let env = env_at(2025, 6, 1, 2, 0);
        let mut unit = unit_for(june_first());
        let reducer = RedemptionReducer::new();

        reducer.reduce(&mut unit, RedemptionAction::Redeem, &env).unwrap();
        let first_used_at = unit.used_at;

        let later = env_at(2025, 6, 1, 9, 0);
        let err = reducer
            .reduce(&mut unit, RedemptionAction::Redeem, &later)
            .unwrap_err();

        assert!(matches!(err, TicketingError::StateConflict(_)));
        assert_eq!(unit.used_at, first_used_at);
    }
}
