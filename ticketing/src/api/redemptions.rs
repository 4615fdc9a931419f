//! Gate API endpoints.
//!
//! - GET /api/redemptions/:code - Pre-scan a code without using it
//! - POST /api/redemptions - Admit the holder of a code

#![allow(clippy::missing_errors_doc)] // Axum handlers return AppError

use super::purchases::UnitResponse;
use crate::server::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use matchday_web::AppError;
use serde::Deserialize;

/// Request to redeem a code.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    /// Code printed on the ticket
    pub code: String,
}

/// Look a code up.
///
/// # Errors
///
/// - 404 unknown code
pub async fn lookup(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<UnitResponse>, AppError> {
    let unit = state.redemptions.lookup(&code).await?;
    Ok(Json(unit.into()))
}

/// Redeem a code.
///
/// # Errors
///
/// - 404 unknown code
/// - 409 already used
/// - 422 blank code, or `WRONG_DAY` when the ticket is for another date
pub async fn redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<UnitResponse>, AppError> {
    let unit = state.redemptions.redeem(&request.code).await?;
    Ok(Json(unit.into()))
}
