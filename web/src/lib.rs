//! Axum integration for matchday ticket sales.
//!
//! Handlers in `matchday-ticketing` stay thin: extract input, call a service,
//! map the result. This crate holds the pieces they share:
//!
//! - [`AppError`]: the JSON error body `{code, message}` and the mapping from
//!   [`matchday_core::TicketingError`] to HTTP status codes
//! - [`MemberIdentity`], [`CallbackToken`], [`CorrelationId`]: extractors
//! - [`correlation_id_layer`]: request correlation and tracing spans
//!
//! # Example
//!
//! ```ignore
//! use matchday_web::{AppError, MemberIdentity};
//!
//! async fn receipt(
//!     State(state): State<AppState>,
//!     MemberIdentity(buyer): MemberIdentity,
//!     Path(id): Path<Uuid>,
//! ) -> Result<Json<ReceiptResponse>, AppError> {
//!     let receipt = state.reservations.purchase(&PurchaseId::from_uuid(id), &buyer).await?;
//!     Ok(Json(receipt.into()))
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod middleware;

pub use error::AppError;
pub use extractors::{
    CallbackToken, CorrelationId, MemberIdentity, CALLBACK_TOKEN_HEADER, MEMBER_ID_HEADER,
};
pub use middleware::{correlation_id_layer, CORRELATION_ID_HEADER};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
