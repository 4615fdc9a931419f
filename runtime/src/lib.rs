//! # Matchday Runtime
//!
//! Background machinery shared by the ticketing services.
//!
//! ## Core Components
//!
//! - **Outbox worker**: dispatches intents recorded alongside purchase
//!   transitions, with per-dispatch timeouts, backoff and dead-lettering
//! - **Retry policy**: exponential backoff, persisted between outbox attempts
//!   or applied in-process for short retries
//! - **Metrics**: Prometheus recorder installation
//!
//! ## Example
//!
//! ```ignore
//! use matchday_runtime::outbox::{OutboxConfig, OutboxWorker};
//!
//! let worker = OutboxWorker::new(store, dispatcher, clock, OutboxConfig::default());
//! let waker = worker.waker();
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(worker.run(shutdown_rx));
//!
//! // after committing a transition that enqueued intents
//! waker.wake();
//! ```

#![forbid(unsafe_code)]

/// Prometheus metrics for observability
pub mod metrics;

/// Durable intent dispatch
pub mod outbox;

/// Retry logic with exponential backoff
pub mod retry;

pub use outbox::{DispatchError, IntentDispatcher, OutboxConfig, OutboxWaker, OutboxWorker};
pub use retry::RetryPolicy;
