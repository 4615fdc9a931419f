//! Shared wiring for the service and HTTP tests.
//!
//! Every service runs over one [`InMemoryStore`] with a fixed clock at
//! 2025-06-01 09:00 WIB, the first fixture ticket's match day.

#![allow(dead_code)] // Not every test binary uses every helper

use matchday_core::environment::{Clock, CodeGenerator};
use matchday_core::redemption::RedemptionEnvironment;
use matchday_core::settlement::{PaymentNotification, SettlementEnvironment};
use matchday_core::types::Purchase;
use matchday_runtime::{OutboxConfig, OutboxWorker, RetryPolicy};
use matchday_testing::{
    test_clock, CatalogFixture, FixedClock, InMemoryStore, MockPaymentGateway, RecordingMailer,
    SequentialCodeGenerator,
};
use matchday_ticketing::{
    AppState, CheckoutSettings, ReadinessProbe, RedemptionService, ReservationService,
    SettlementService, Stores, TicketingDispatcher,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Callback token the test state expects.
pub const CALLBACK_TOKEN: &str = "test-callback-token";

/// Services and doubles over one seeded store.
pub struct Harness {
    pub store: InMemoryStore,
    pub catalog: CatalogFixture,
    pub gateway: MockPaymentGateway,
    pub mailer: RecordingMailer,
    pub clock: FixedClock,
    pub reservations: Arc<ReservationService>,
    pub settlements: Arc<SettlementService>,
    pub redemptions: Arc<RedemptionService>,
    pub worker: OutboxWorker,
}

impl Harness {
    /// One ticket per entry of `stocks`, on consecutive days from 2025-06-01.
    pub async fn new(stocks: &[u32]) -> Self {
        let store = InMemoryStore::new();
        let catalog = CatalogFixture::seed(&store, stocks).await;
        let gateway = MockPaymentGateway::new();
        let mailer = RecordingMailer::new();
        let clock = test_clock();

        let stores = Stores::shared(Arc::new(store.clone()));
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let codes: Arc<dyn CodeGenerator> = Arc::new(SequentialCodeGenerator::new());

        let worker = OutboxWorker::new(
            stores.outbox.clone(),
            Arc::new(TicketingDispatcher::new(
                stores.clone(),
                Arc::new(mailer.clone()),
            )),
            shared_clock.clone(),
            OutboxConfig {
                poll_interval: Duration::from_millis(10),
                batch_size: 50,
                dispatch_timeout: Duration::from_secs(1),
                retry: RetryPolicy::builder()
                    .max_attempts(3)
                    .initial_delay(Duration::from_secs(1))
                    .build(),
            },
        );

        let settings = CheckoutSettings {
            credit_retry: RetryPolicy::builder()
                .max_attempts(2)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(1))
                .build(),
            ..CheckoutSettings::default()
        };

        let reservations = ReservationService::new(
            stores.clone(),
            Arc::new(gateway.clone()),
            shared_clock.clone(),
            codes.clone(),
            settings,
        )
        .with_waker(worker.waker());
        let settlements = SettlementService::new(
            stores.clone(),
            SettlementEnvironment::new(shared_clock.clone(), codes),
        )
        .with_waker(worker.waker());
        let redemptions = RedemptionService::new(stores, RedemptionEnvironment::new(shared_clock));

        Self {
            store,
            catalog,
            gateway,
            mailer,
            clock,
            reservations: Arc::new(reservations),
            settlements: Arc::new(settlements),
            redemptions: Arc::new(redemptions),
            worker,
        }
    }

    /// HTTP state over the same services.
    pub fn state(&self) -> AppState {
        AppState::new(
            self.reservations.clone(),
            self.settlements.clone(),
            self.redemptions.clone(),
            CALLBACK_TOKEN,
            Arc::new(AlwaysReady),
        )
    }

    /// Remaining units of fixture ticket `index`.
    pub async fn remaining(&self, index: usize) -> u32 {
        self.store
            .quota(&self.catalog.tickets[index].id)
            .await
            .map_or(0, |quota| quota.remaining())
    }
}

/// The notification the gateway would send for `purchase`.
pub fn notification(purchase: &Purchase, status: &str) -> PaymentNotification {
    PaymentNotification {
        id: MockPaymentGateway::invoice_id_for(&purchase.invoice.external_id),
        external_id: purchase.invoice.external_id.clone(),
        status: status.to_string(),
        paid_at: None,
        payment_method: Some("BANK_TRANSFER".to_string()),
        bank_code: Some("BCA".to_string()),
        payment_channel: Some("BCA".to_string()),
        payment_destination: Some("8808999912345678".to_string()),
        merchant_name: None,
    }
}

/// Readiness probe that never fails.
pub struct AlwaysReady;

impl ReadinessProbe for AlwaysReady {
    fn is_ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async { true })
    }
}
