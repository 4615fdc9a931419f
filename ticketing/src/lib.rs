//! Matchday ticket sales - checkout, settlement and gate redemption.
//!
//! Sells dated match tickets against a finite stock, collects payment through
//! a hosted-invoice gateway and admits ticket holders on match day.
//!
//! # Architecture
//!
//! ```text
//!   POST /api/tickets/:id/purchases          POST /api/webhooks/payments
//!               │                                        │
//!               ▼                                        ▼
//!    ┌────────────────────┐                  ┌────────────────────┐
//!    │ ReservationService │                  │ SettlementService  │
//!    │ debit ─▶ link ─▶   │                  │ SettlementReducer  │
//!    │ insert Pending     │                  │ commit + outbox    │
//!    └────────────────────┘                  └────────────────────┘
//!          │       │                                    │
//!          ▼       ▼                                    ▼
//!   InventoryLedger  PaymentGateway           ┌────────────────────┐
//!                                             │    OutboxWorker    │
//!                                             │ credit-back, email │
//!                                             └────────────────────┘
//! ```
//!
//! # Key Features
//!
//! ## 1. No overselling
//!
//! Checkout debits inventory with one conditional update per ticket before
//! anything is persisted:
//!
//! ```text
//! UPDATE tickets SET used = used + $amount
//!  WHERE id = $id AND stock - used >= $amount
//! ```
//!
//! Of two checkouts racing for the last units, exactly one wins. Every later
//! failure (gateway, storage) credits the units back.
//!
//! ## 2. Exactly-once settlement
//!
//! A webhook moves a purchase out of `Pending` at most once. The status
//! change, the issued units and the outbox intents commit in one transaction
//! guarded by `status = 'pending'`; replays answer `duplicate`.
//!
//! ## 3. Durable side effects
//!
//! Credit-backs for failed payments and code emails for paid ones are
//! recorded as outbox intents and executed by a background worker with
//! backoff and dead-lettering.
//!
//! ## 4. Match-day redemption
//!
//! A code is redeemable once, on its match date in WIB (UTC+07:00).

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod app;
pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod payment_gateway;
pub mod server;

pub use app::{
    CheckoutSettings, LogMailer, Receipt, RedemptionService, ReservationService,
    SettlementService, Stores, TicketingDispatcher,
};
pub use config::Config;
pub use payment_gateway::HttpPaymentGateway;
pub use server::{build_router, AppState, ReadinessProbe};
