use anyhow::Context;
use rocks_api::{
    app,
    state::{AppState, AuthConfig},
    worker,
};
use rocks_booking::{CheckoutSettings, MockIntentGateway, MockRedirectGateway};
use rocks_core::payment::PaymentGateway;
use rocks_core::repository::DocumentStore;
use rocks_store::app_config::{Config, StoreBackend};
use rocks_store::{MemoryStore, PayPalGateway, PgStore, RedisStore, StripeGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Redis => {
            let url = config.store.redis_url.as_deref().context("store.redis_url is required")?;
            Arc::new(
                RedisStore::new(url, &config.store.redis_key_prefix)
                    .await
                    .context("Failed to connect to Redis")?,
            )
        }
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("store.database_url is required")?;
            let pg = PgStore::new(url).await.context("Failed to connect to Postgres")?;
            pg.migrate().await.context("Failed to run migrations")?;
            Arc::new(pg)
        }
    };
    Ok(store)
}

fn build_gateways(config: &Config, timeout: Duration) -> anyhow::Result<Vec<Arc<dyn PaymentGateway>>> {
    let payments = &config.payments;

    let paypal: Arc<dyn PaymentGateway> = if payments.paypal.is_configured() {
        tracing::info!("PayPal gateway in {} mode", payments.paypal.mode);
        Arc::new(PayPalGateway::new(&payments.paypal, &payments.currency, timeout)?)
    } else {
        tracing::warn!("PayPal credentials missing or MOCK; using the mock redirect gateway");
        let secret = payments.paypal.webhook_id.clone().unwrap_or_else(|| "mock-webhook-id".to_string());
        Arc::new(MockRedirectGateway::new(secret, payments.frontend_url.clone()))
    };

    let stripe: Arc<dyn PaymentGateway> = if payments.stripe.is_configured() {
        Arc::new(StripeGateway::new(&payments.stripe, &payments.currency, timeout)?)
    } else {
        tracing::warn!("Stripe secret key missing; using the mock intent gateway");
        let secret = payments.stripe.webhook_secret.clone().unwrap_or_else(|| "whsec_mock".to_string());
        Arc::new(MockIntentGateway::new(secret))
    };

    Ok(vec![paypal, stripe])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rocks_api=debug,rocks_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting 9 Rocks Tours API on port {}", config.server.port);

    let store = build_store(&config).await?;
    let gateway_timeout = Duration::from_secs(config.business_rules.gateway_timeout_seconds);
    let gateways = build_gateways(&config, gateway_timeout)?;

    let app_state = AppState::new(
        store,
        gateways,
        CheckoutSettings {
            currency: config.payments.currency.clone(),
            frontend_url: config.payments.frontend_url.clone(),
            gateway_timeout,
        },
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            admin_username: config.auth.admin_username.clone(),
            admin_password: config.auth.admin_password.clone(),
        },
        config.business_rules.clone(),
    );

    worker::start_maintenance_worker(app_state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
