//! Matchday ticketing HTTP server.
//!
//! Checkout, payment webhooks and gate redemption over `PostgreSQL`, with a
//! background outbox worker for credit-backs and code emails.

use matchday_ticketing::bootstrap::{Application, ResourceManager};
use matchday_ticketing::config::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,matchday_ticketing=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting matchday ticketing server");

    let config = Config::from_env();
    info!(
        port = config.server.port,
        metrics_port = config.server.metrics_port,
        gateway = %config.gateway.base_url,
        max_units = config.checkout.max_units,
        "Configuration loaded"
    );

    let resources = ResourceManager::from_config(&config).await?;
    Application::new(resources).run().await
}
