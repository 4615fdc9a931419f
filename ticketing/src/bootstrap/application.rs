//! Application lifecycle.
//!
//! 1. Wire the services over the shared resources
//! 2. Spawn the outbox worker
//! 3. Serve the API and the metrics listener
//! 4. On SIGINT/SIGTERM: stop accepting requests, stop the worker, exit

use super::ResourceManager;
use crate::app::{
    CheckoutSettings, RedemptionService, ReservationService, SettlementService,
    TicketingDispatcher,
};
use crate::server::{build_router, AppState};
use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use matchday_core::redemption::RedemptionEnvironment;
use matchday_core::settlement::SettlementEnvironment;
use matchday_runtime::metrics::MetricsServer;
use matchday_runtime::OutboxWorker;
use matchday_web::correlation_id_layer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// A wired application, ready to run.
pub struct Application {
    resources: ResourceManager,
    state: AppState,
    worker: OutboxWorker,
}

impl Application {
    /// Build every service over `resources`.
    #[must_use]
    pub fn new(resources: ResourceManager) -> Self {
        let config = &resources.config;
        let stores = resources.stores();

        let dispatcher = Arc::new(TicketingDispatcher::new(
            stores.clone(),
            resources.mailer.clone(),
        ));
        let worker = OutboxWorker::new(
            stores.outbox.clone(),
            dispatcher,
            resources.clock.clone(),
            config.outbox_config(),
        );
        let waker = worker.waker();

        let settings = CheckoutSettings {
            max_units: config.checkout.max_units,
            external_id_prefix: config.checkout.external_id_prefix.clone(),
            ..CheckoutSettings::default()
        };

        let reservations = ReservationService::new(
            stores.clone(),
            resources.payment_gateway.clone(),
            resources.clock.clone(),
            resources.codes.clone(),
            settings,
        )
        .with_waker(waker.clone());

        let settlements = SettlementService::new(
            stores.clone(),
            SettlementEnvironment::new(resources.clock.clone(), resources.codes.clone()),
        )
        .with_waker(waker);

        let redemptions =
            RedemptionService::new(stores, RedemptionEnvironment::new(resources.clock.clone()));

        let state = AppState::new(
            Arc::new(reservations),
            Arc::new(settlements),
            Arc::new(redemptions),
            &config.gateway.callback_token,
            resources.store.clone(),
        );

        Self {
            resources,
            state,
            worker,
        }
    }

    /// Serve until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns error if a listener cannot bind or the server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = self.resources.config.clone();

        let metrics_addr: SocketAddr = format!(
            "{}:{}",
            config.server.metrics_host, config.server.metrics_port
        )
        .parse()
        .context("parsing metrics address")?;
        let mut metrics = MetricsServer::new(metrics_addr);
        metrics.start().context("installing metrics recorder")?;
        crate::metrics::register_business_metrics();

        // Report leftovers from before this process started
        if let Err(err) = self.state.settlements.reconcile().await {
            error!(error = %err, "Startup reconciliation failed");
        }
        report_dead_letters(&self.resources).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(self.worker.run(shutdown_rx));
        info!("Outbox worker started");

        let metrics_app = Router::new()
            .route("/metrics", get(render_metrics))
            .with_state(Arc::new(metrics));
        let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
            .await
            .context("binding metrics listener")?;
        info!(address = %metrics_addr, "Metrics server listening");
        let mut metrics_shutdown = shutdown_tx.subscribe();
        let metrics_server = tokio::spawn(async move {
            let served = axum::serve(metrics_listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = metrics_shutdown.changed().await;
                })
                .await;
            if let Err(err) = served {
                error!(error = %err, "Metrics server failed");
            }
        });

        let app = build_router(self.state)
            .layer(TimeoutLayer::new(config.request_timeout()))
            .layer(TraceLayer::new_for_http())
            .layer(correlation_id_layer());

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        info!(address = %addr, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        info!("HTTP server stopped, draining background tasks");
        let _ = shutdown_tx.send(true);

        let grace = Duration::from_secs(config.server.shutdown_timeout);
        if tokio::time::timeout(grace, async {
            let _ = worker.await;
            let _ = metrics_server.await;
        })
        .await
        .is_err()
        {
            error!(timeout_secs = grace.as_secs(), "Background tasks did not stop in time");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

async fn report_dead_letters(resources: &ResourceManager) {
    match resources.store.count_dead_letters().await {
        Ok(count) => {
            crate::metrics::record_dead_letters(count);
            if count > 0 {
                warn!(count, "Outbox has dead-lettered entries awaiting an operator");
            }
        }
        Err(err) => error!(error = %err, "Counting dead letters failed"),
    }
}

async fn render_metrics(State(metrics): State<Arc<MetricsServer>>) -> (StatusCode, String) {
    match metrics.render() {
        Some(body) => (StatusCode::OK, body),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
