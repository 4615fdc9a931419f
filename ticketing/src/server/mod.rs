//! HTTP server module for the ticketing system.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Health check endpoints
//! - Router configuration

pub mod health;
pub mod routes;
pub mod state;

pub use health::{health_check, ReadinessProbe};
pub use routes::build_router;
pub use state::AppState;
