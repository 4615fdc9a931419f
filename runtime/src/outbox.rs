//! Outbox worker.
//!
//! Drains intents recorded by purchase transitions and hands each one to an
//! [`IntentDispatcher`]. Every dispatch runs under its own timeout on the
//! worker task, so it is never tied to the HTTP request that produced it.
//!
//! # Delivery
//!
//! At-least-once. An entry is completed only after its dispatch returns `Ok`;
//! a crash or a failed `complete` between the two replays the entry. Each
//! dispatch receives the whole [`OutboxEntry`], so side effects that must not
//! repeat (inventory credits) are keyed by the entry ID in storage.
//!
//! Due entries are claimed with a lease rather than read: a claimed entry is
//! invisible to other workers until `next_attempt_at` passes the lease, which
//! covers the whole batch at the dispatch timeout.
//!
//! # Lifecycle
//!
//! ```text
//! due ──dispatch ok──▶ completed
//!  │
//!  ├──fails, budget left──▶ rescheduled (backoff) ──▶ due
//!  │
//!  └──fails, budget spent / permanent──▶ dead-lettered
//! ```

use crate::metrics::OutboxMetrics;
use crate::retry::RetryPolicy;
use matchday_core::environment::Clock;
use matchday_core::intent::OutboxEntry;
use matchday_core::store::OutboxStore;
use matchday_core::StoreError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};

/// Why a dispatch did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Worth retrying later.
    #[error("dispatch failed: {0}")]
    Failed(String),

    /// Retrying cannot help (e.g. the referenced purchase is gone).
    #[error("dispatch failed permanently: {0}")]
    Permanent(String),

    /// The dispatch exceeded its timeout.
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),
}

/// Executes one intent.
///
/// Implemented by the application, which owns the ledger and the mailer.
pub trait IntentDispatcher: Send + Sync {
    /// Perform the entry's intent. The entry ID is stable across
    /// redeliveries and may be used as an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the side effect did not happen.
    fn dispatch<'a>(
        &'a self,
        entry: &'a OutboxEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'a>>;
}

/// Outbox worker configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How long to sleep when nobody wakes the worker
    pub poll_interval: Duration,
    /// Entries fetched per query
    pub batch_size: u32,
    /// Upper bound on a single dispatch
    pub dispatch_timeout: Duration,
    /// Backoff and attempt budget
    pub retry: RetryPolicy,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            dispatch_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries dispatched successfully
    pub completed: usize,
    /// Entries pushed back for another attempt
    pub retried: usize,
    /// Entries given up on
    pub dead_lettered: usize,
}

impl DrainReport {
    /// Entries touched in this pass.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.completed + self.retried + self.dead_lettered
    }
}

/// Handle for nudging the worker after a commit.
#[derive(Clone, Default)]
pub struct OutboxWaker(Arc<Notify>);

impl OutboxWaker {
    /// Creates a new waker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the worker now instead of at the next poll.
    pub fn wake(&self) {
        self.0.notify_one();
    }

    async fn woken(&self) {
        self.0.notified().await;
    }
}

/// Background dispatcher for outbox entries.
pub struct OutboxWorker {
    store: Arc<dyn OutboxStore>,
    dispatcher: Arc<dyn IntentDispatcher>,
    clock: Arc<dyn Clock>,
    config: OutboxConfig,
    waker: OutboxWaker,
}

impl OutboxWorker {
    /// Create a new worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn OutboxStore>,
        dispatcher: Arc<dyn IntentDispatcher>,
        clock: Arc<dyn Clock>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            config,
            waker: OutboxWaker::new(),
        }
    }

    /// Use an existing waker (shared with the services that enqueue).
    #[must_use]
    pub fn with_waker(mut self, waker: OutboxWaker) -> Self {
        self.waker = waker;
        self
    }

    /// The waker services call after committing intents.
    #[must_use]
    pub fn waker(&self) -> OutboxWaker {
        self.waker.clone()
    }

    /// Dispatch one batch of due entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the batch cannot be loaded or an entry's
    /// outcome cannot be recorded. Entries already handled stay handled.
    pub async fn drain_once(&self) -> Result<DrainReport, StoreError> {
        let now = self.clock.now();
        let due = self
            .store
            .claim_due(now, now + self.lease(), self.config.batch_size)
            .await?;

        let mut report = DrainReport::default();
        for entry in due {
            self.process(&entry, &mut report).await?;
        }

        if report.processed() > 0 {
            tracing::debug!(
                completed = report.completed,
                retried = report.retried,
                dead_lettered = report.dead_lettered,
                "Outbox batch drained"
            );
        }

        Ok(report)
    }

    /// How long a claim hides its batch: one dispatch timeout per entry,
    /// plus one for the bookkeeping.
    fn lease(&self) -> chrono::Duration {
        let per_batch = self
            .config
            .dispatch_timeout
            .saturating_mul(self.config.batch_size.saturating_add(1));
        chrono::Duration::from_std(per_batch).unwrap_or_else(|_| chrono::Duration::days(1))
    }

    async fn process(&self, entry: &OutboxEntry, report: &mut DrainReport) -> Result<(), StoreError> {
        let kind = entry.intent.kind();
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.config.dispatch_timeout,
            self.dispatcher.dispatch(entry),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.config.dispatch_timeout)),
        };

        let now = self.clock.now();
        match result {
            Ok(()) => {
                self.store.complete(&entry.id, now).await?;
                OutboxMetrics::record_dispatch(kind, "completed", started.elapsed());
                tracing::info!(
                    entry_id = %entry.id,
                    intent = kind,
                    purchase_id = %entry.intent.purchase_id(),
                    "Outbox intent dispatched"
                );
                report.completed += 1;
            }
            Err(err) => {
                let attempts = entry.attempts.saturating_add(1);
                let permanent = matches!(err, DispatchError::Permanent(_));
                let message = err.to_string();

                if permanent || self.config.retry.is_exhausted(attempts) {
                    self.store.dead_letter(&entry.id, now, &message).await?;
                    OutboxMetrics::record_dispatch(kind, "dead_lettered", started.elapsed());
                    tracing::error!(
                        entry_id = %entry.id,
                        intent = kind,
                        purchase_id = %entry.intent.purchase_id(),
                        attempts,
                        error = %message,
                        "Outbox intent dead-lettered"
                    );
                    report.dead_lettered += 1;
                } else {
                    let next_attempt_at = self.config.retry.next_attempt_at(now, attempts);
                    self.store
                        .reschedule(&entry.id, next_attempt_at, &message)
                        .await?;
                    OutboxMetrics::record_dispatch(kind, "retried", started.elapsed());
                    tracing::warn!(
                        entry_id = %entry.id,
                        intent = kind,
                        attempts,
                        %next_attempt_at,
                        error = %message,
                        "Outbox intent failed, rescheduled"
                    );
                    report.retried += 1;
                }
            }
        }

        Ok(())
    }

    /// Drain until `shutdown` flips to `true`.
    ///
    /// Between passes the worker sleeps for the poll interval or until woken.
    /// A full batch is followed immediately by another pass.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            batch_size = self.config.batch_size,
            "Outbox worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let full_batch = match self.drain_once().await {
                Ok(report) => report.processed() >= self.config.batch_size as usize,
                Err(err) => {
                    tracing::error!(error = %err, "Outbox drain failed");
                    false
                }
            };

            if full_batch {
                continue;
            }

            tokio::select! {
                () = self.waker.woken() => {}
                () = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Outbox worker stopped");
    }
}
