//! Gate redemption.

use super::Stores;
use crate::metrics;
use matchday_core::reducer::Reducer;
use matchday_core::redemption::{RedemptionAction, RedemptionEnvironment, RedemptionReducer};
use matchday_core::store::CommitOutcome;
use matchday_core::types::TicketPurchase;
use matchday_core::{Result, TicketingError};

/// Redemption service.
pub struct RedemptionService {
    stores: Stores,
    reducer: RedemptionReducer,
    env: RedemptionEnvironment,
}

impl RedemptionService {
    /// Create a new redemption service
    #[must_use]
    pub const fn new(stores: Stores, env: RedemptionEnvironment) -> Self {
        Self {
            stores,
            reducer: RedemptionReducer::new(),
            env,
        }
    }

    /// Look a code up without using it.
    ///
    /// # Errors
    ///
    /// - `Validation`: blank code
    /// - `NotFound`: unknown code
    /// - `Persistence`: storage failed
    pub async fn lookup(&self, code: &str) -> Result<TicketPurchase> {
        let code = normalize(code)?;
        self.stores
            .units
            .unit_by_code(code)
            .await?
            .ok_or_else(|| TicketingError::not_found("code", code))
    }

    /// Admit the holder of `code`.
    ///
    /// # Errors
    ///
    /// - `Validation`: blank code
    /// - `NotFound`: unknown code
    /// - `WrongDay`: the ticket is for another WIB date
    /// - `StateConflict`: already used, or used concurrently
    /// - `Persistence`: storage failed
    #[tracing::instrument(skip(self))]
    pub async fn redeem(&self, code: &str) -> Result<TicketPurchase> {
        let mut unit = match self.lookup(code).await {
            Ok(unit) => unit,
            Err(err) => {
                if matches!(err, TicketingError::NotFound { .. }) {
                    metrics::record_redemption("unknown_code");
                }
                return Err(err);
            }
        };

        if let Err(err) = self
            .reducer
            .reduce(&mut unit, RedemptionAction::Redeem, &self.env)
        {
            let outcome = match &err {
                TicketingError::WrongDay { .. } => "wrong_day",
                _ => "already_used",
            };
            metrics::record_redemption(outcome);
            tracing::warn!(unit_id = %unit.id, error = %err, "Redemption refused");
            return Err(err);
        }

        let used_at = unit.used_at.unwrap_or_else(|| self.env.clock.now());
        if self.stores.units.mark_used(&unit.id, used_at).await? == CommitOutcome::Stale {
            metrics::record_redemption("already_used");
            tracing::warn!(unit_id = %unit.id, "Code redeemed concurrently");
            return Err(TicketingError::conflict(format!(
                "code {} was already redeemed",
                unit.code
            )));
        }

        metrics::record_redemption("redeemed");
        tracing::info!(
            unit_id = %unit.id,
            purchase_id = %unit.purchase_id,
            match_date = %unit.ticket.match_date,
            "Ticket redeemed"
        );

        Ok(unit)
    }
}

fn normalize(code: &str) -> Result<&str> {
    let code = code.trim();
    if code.is_empty() {
        return Err(TicketingError::validation("code", "must not be empty"));
    }
    Ok(code)
}
