//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request's correlation id (see [`crate::middleware`])
//! - `MemberIdentity`: the buyer asserted by the upstream authenticator
//! - `CallbackToken`: the shared secret the payment gateway sends on webhooks
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     correlation_id: CorrelationId,
//!     MemberIdentity(member_id): MemberIdentity,
//! ) -> Result<Json<Receipt>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, %member_id, "Checkout");
//!     Ok(Json(receipt))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use matchday_core::types::MemberId;
use uuid::Uuid;

/// Header carrying the authenticated member's id.
pub const MEMBER_ID_HEADER: &str = "X-Member-Id";

/// Header carrying the payment gateway's callback token.
pub const CALLBACK_TOKEN_HEADER: &str = "X-Callback-Token";

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation middleware ran,
/// otherwise from the `X-Correlation-ID` header, otherwise freshly generated.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// The member on whose behalf the request is made.
///
/// Authentication happens upstream; this only parses the asserted id.
/// A missing or malformed header is rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberIdentity(pub MemberId);

#[async_trait]
impl<S> FromRequestParts<S> for MemberIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(MEMBER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized(format!("Missing {MEMBER_ID_HEADER} header")))?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::unauthorized(format!("Malformed {MEMBER_ID_HEADER} header")))?;

        Ok(Self(MemberId::from_uuid(id)))
    }
}

/// The token presented on a payment webhook, if any.
///
/// Comparison against the configured secret is left to the handler.
#[derive(Debug, Clone, Default)]
pub struct CallbackToken(pub Option<String>);

impl CallbackToken {
    /// Whether the presented token equals `expected`.
    ///
    /// Compares in constant time with respect to the token contents.
    #[must_use]
    pub fn matches(&self, expected: &str) -> bool {
        self.0.as_deref().is_some_and(|token| {
            constant_time_eq::constant_time_eq(token.as_bytes(), expected.as_bytes())
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallbackToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(CALLBACK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Self(token))
    }
}
