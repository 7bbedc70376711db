use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub redis_key_prefix: String,
}

fn default_key_prefix() -> String {
    "rocks".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    pub admin_username: String,
    pub admin_password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    pub frontend_url: String,
    #[serde(default)]
    pub paypal: PayPalConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PayPalConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// `sandbox` or `live`.
    #[serde(default = "default_paypal_mode")]
    pub mode: String,
    pub webhook_id: Option<String>,
}

fn default_paypal_mode() -> String {
    "sandbox".to_string()
}

impl Default for PayPalConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            mode: default_paypal_mode(),
            webhook_id: None,
        }
    }
}

impl PayPalConfig {
    /// Real credentials present. Client ids starting with `MOCK` select the mock gateway.
    pub fn is_configured(&self) -> bool {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => !id.is_empty() && !secret.is_empty() && !id.starts_with("MOCK"),
            _ => false,
        }
    }

    pub fn api_base(&self) -> &'static str {
        if self.mode == "live" {
            "https://api-m.paypal.com"
        } else {
            "https://api-m.sandbox.paypal.com"
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub publishable_key: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default = "default_tolerance")]
    pub webhook_tolerance_seconds: u64,
}

fn default_tolerance() -> u64 {
    300
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            publishable_key: None,
            webhook_secret: None,
            webhook_tolerance_seconds: default_tolerance(),
        }
    }
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        self.secret_key.as_deref().is_some_and(|k| k.starts_with("sk_"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_seconds: u64,
    /// 0 disables the background sync worker.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
    #[serde(default = "default_stale_payment")]
    pub stale_payment_seconds: u64,
    /// Whether the background sync also drops dates no live booking holds.
    #[serde(default = "default_sync_prune")]
    pub sync_prune: bool,
}

fn default_gateway_timeout() -> u64 {
    15
}

fn default_sync_interval() -> u64 {
    300
}

fn default_stale_payment() -> u64 {
    1800
}

fn default_sync_prune() -> bool {
    true
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            gateway_timeout_seconds: default_gateway_timeout(),
            sync_interval_seconds: default_sync_interval(),
            stale_payment_seconds: default_stale_payment(),
            sync_prune: default_sync_prune(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `ROCKS_PAYMENTS__STRIPE__SECRET_KEY=sk_live_..`
            .add_source(config::Environment::with_prefix("ROCKS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        port = 8001

        [store]
        backend = "memory"

        [auth]
        jwt_secret = "secret"
        jwt_expiration_seconds = 3600
        admin_username = "admin"
        admin_password = "password"

        [payments]
        frontend_url = "http://localhost:3000"

        [payments.paypal]
        client_id = "MOCK_CLIENT"
        client_secret = "MOCK_SECRET"
    "#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg: Config = config::Config::builder()
            .add_source(config::File::from_str(MINIMAL, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.payments.currency, "EUR");
        assert_eq!(cfg.business_rules.gateway_timeout_seconds, 15);
        assert!(cfg.business_rules.sync_prune);
        assert_eq!(cfg.payments.stripe.webhook_tolerance_seconds, 300);
        assert!(!cfg.payments.paypal.is_configured());
        assert!(!cfg.payments.stripe.is_configured());
        assert_eq!(cfg.payments.paypal.api_base(), "https://api-m.sandbox.paypal.com");
    }
}
