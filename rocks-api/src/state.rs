use rocks_booking::{
    CheckoutSettings, OccupancyFeed, OccupancySync, PaymentOrchestrator, Reconciler, ReservationEngine, StatsService,
    TourCatalog,
};
use rocks_core::payment::PaymentGateway;
use rocks_core::repository::DocumentStore;
use rocks_store::app_config::BusinessRules;
use std::sync::Arc;
use std::time::Duration;

use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub admin_username: String,
    pub admin_password: String,
}

pub struct ResiliencyState {
    pub payment_cb: CircuitBreaker,
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self {
            payment_cb: CircuitBreaker::new("payments", 5, Duration::from_secs(30)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub feed: OccupancyFeed,
    pub catalog: Arc<TourCatalog>,
    pub reservations: Arc<ReservationEngine>,
    pub payments: Arc<PaymentOrchestrator>,
    pub sync: Arc<OccupancySync>,
    pub stats: Arc<StatsService>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub resiliency: Arc<ResiliencyState>,
}

impl AppState {
    /// Wires every service around one store handle and one occupancy feed.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateways: Vec<Arc<dyn PaymentGateway>>,
        checkout: CheckoutSettings,
        auth: AuthConfig,
        business_rules: BusinessRules,
    ) -> Self {
        let feed = OccupancyFeed::default();
        let reconciler = Arc::new(Reconciler::new(store.clone(), feed.clone()));
        let payments = gateways.into_iter().fold(
            PaymentOrchestrator::new(store.clone(), reconciler.clone(), checkout),
            PaymentOrchestrator::with_gateway,
        );

        Self {
            catalog: Arc::new(TourCatalog::new(store.clone())),
            reservations: Arc::new(ReservationEngine::new(store.clone(), feed.clone())),
            payments: Arc::new(payments),
            sync: Arc::new(OccupancySync::new(store.clone(), reconciler)),
            stats: Arc::new(StatsService::new(store.clone())),
            store,
            feed,
            auth,
            business_rules,
            resiliency: Arc::new(ResiliencyState::default()),
        }
    }
}
