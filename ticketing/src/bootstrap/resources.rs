//! Resource management for infrastructure setup.
//!
//! Centralizes infrastructure initialization into a single
//! `ResourceManager`:
//!
//! 1. Connect to `PostgreSQL` and apply migrations
//! 2. Build the payment gateway client
//! 3. Pick the system clock, code generator and mailer
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let resources = ResourceManager::from_config(&config).await?;
//! ```

use crate::app::{LogMailer, Stores};
use crate::config::Config;
use crate::payment_gateway::HttpPaymentGateway;
use anyhow::Context;
use matchday_core::environment::{Clock, CodeGenerator, RandomCodeGenerator, SystemClock};
use matchday_core::gateway::PaymentGateway;
use matchday_core::mailer::Mailer;
use matchday_postgres::PostgresStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Central resource manager for all infrastructure components.
///
/// All resources are wrapped in `Arc` so they can be shared across the HTTP
/// handlers and the outbox worker.
#[derive(Clone)]
pub struct ResourceManager {
    /// Application configuration
    pub config: Arc<Config>,

    /// System clock for timestamps
    pub clock: Arc<dyn Clock>,

    /// Redemption codes and invoice suffixes
    pub codes: Arc<dyn CodeGenerator>,

    /// Purchases, units, inventory, catalog and outbox
    pub store: Arc<PostgresStore>,

    /// Hosted-invoice payment gateway
    pub payment_gateway: Arc<dyn PaymentGateway>,

    /// Redemption code delivery
    pub mailer: Arc<dyn Mailer>,
}

impl ResourceManager {
    /// Initialize all infrastructure resources from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Database connection fails
    /// - Database migrations fail
    /// - The gateway HTTP client cannot be built
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        info!("Connecting to database...");
        let store = PostgresStore::connect(&config.postgres.url, &config.pool_settings())
            .await
            .context("connecting to PostgreSQL")?;

        info!("Running migrations...");
        store.migrate().await.context("running migrations")?;
        info!("Database ready");

        if config.gateway.secret_key.is_empty() {
            warn!("GATEWAY_SECRET_KEY is not set, paid checkouts will be rejected by the gateway");
        }
        if config.gateway.callback_token.is_empty() {
            warn!("GATEWAY_CALLBACK_TOKEN is not set, every payment webhook will be refused");
        }

        let payment_gateway = HttpPaymentGateway::new(&config.gateway, config.gateway_timeout())
            .context("building payment gateway client")?;
        info!(
            base_url = %config.gateway.base_url,
            timeout_ms = config.gateway_timeout().as_millis(),
            "Payment gateway initialized"
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            clock: Arc::new(SystemClock),
            codes: Arc::new(RandomCodeGenerator),
            store: Arc::new(store),
            payment_gateway: Arc::new(payment_gateway),
            mailer: Arc::new(LogMailer),
        })
    }

    /// Every storage seam, backed by the one Postgres store.
    #[must_use]
    pub fn stores(&self) -> Stores {
        Stores::shared(self.store.clone())
    }
}
