//! Health check endpoints for the ticketing system.
//!
//! Provides endpoints for monitoring service health and readiness.

use super::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use matchday_postgres::PostgresStore;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Something `/ready` can ask whether the database answers.
pub trait ReadinessProbe: Send + Sync {
    /// `true` if the dependency is reachable.
    fn is_ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

impl ReadinessProbe for PostgresStore {
    fn is_ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            match self.ping().await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, "Database readiness check failed");
                    false
                }
            }
        })
    }
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Health check endpoint.
///
/// Returns 200 OK if the service is running.
/// This is a simple liveness check - it doesn't verify dependencies.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Database connectivity
    pub database: bool,
}

/// Readiness check endpoint.
///
/// Returns 200 OK when the database answers, 503 otherwise. Used by
/// readiness probes to decide whether the instance should receive traffic.
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"database":true}
/// ```
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let database = state.readiness.is_ready().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: database,
            database,
        }),
    )
}
