use async_trait::async_trait;
use rocks_core::payment::{
    CreatedPayment, GatewayError, GatewayKind, PaymentConfirmation, PaymentGateway, PaymentMethod, PaymentRequest,
    TransactionStatus, WebhookEvent, WebhookHeaders,
};
use rocks_core::webhook::parse_paypal_event;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::{error_from_response, format_amount, transport_error};
use crate::app_config::PayPalConfig;

/// Headers PayPal signs webhook deliveries with.
const TRANSMISSION_HEADERS: [(&str, &str); 5] = [
    ("auth_algo", "paypal-auth-algo"),
    ("cert_url", "paypal-cert-url"),
    ("transmission_id", "paypal-transmission-id"),
    ("transmission_sig", "paypal-transmission-sig"),
    ("transmission_time", "paypal-transmission-time"),
];

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Redirect-flow gateway over the PayPal v1 payments REST API.
pub struct PayPalGateway {
    client_id: String,
    client_secret: String,
    webhook_id: Option<String>,
    api_base: String,
    mode: String,
    currency: String,
    client: reqwest::Client,
    timeout_secs: u64,
    token: RwLock<Option<AccessToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PayPalPayment {
    id: String,
    state: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    transactions: Vec<PayPalTransaction>,
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PayPalTransaction {
    #[serde(default)]
    related_resources: Vec<RelatedResource>,
}

#[derive(Debug, Deserialize)]
struct RelatedResource {
    sale: Option<Sale>,
}

#[derive(Debug, Deserialize)]
struct Sale {
    id: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    verification_status: String,
}

impl PayPalPayment {
    fn sale(&self) -> Option<&Sale> {
        self.transactions
            .iter()
            .flat_map(|t| t.related_resources.iter())
            .find_map(|r| r.sale.as_ref())
    }

    fn status(&self) -> TransactionStatus {
        match (self.state.as_str(), self.sale().map(|s| s.state.as_str())) {
            ("approved", Some("completed")) => TransactionStatus::Completed,
            ("approved", Some("denied")) | ("approved", Some("failed")) => TransactionStatus::Failed,
            ("approved", _) => TransactionStatus::Approved,
            ("failed", _) => TransactionStatus::Failed,
            ("canceled", _) | ("cancelled", _) | ("expired", _) => TransactionStatus::Cancelled,
            _ => TransactionStatus::Created,
        }
    }

    fn into_confirmation(self) -> PaymentConfirmation {
        let status = self.status();
        let transaction_id = self.sale().map(|s| s.id.clone());
        PaymentConfirmation {
            payment_id: self.id,
            status,
            transaction_id,
            failure_reason: self.failure_reason,
        }
    }
}

/// Request body for `POST /v1/payments/payment`.
fn payment_body(request: &PaymentRequest) -> Value {
    let total = format_amount(request.amount);
    let mut payer = json!({ "payment_method": "paypal" });
    match request.payment_method {
        PaymentMethod::Multibanco => {
            payer = json!({
                "payment_method": "multibanco",
                "funding_instruments": [{ "multibanco": { "country_code": "PT" } }]
            });
        }
        PaymentMethod::Mbway => {
            payer = json!({
                "payment_method": "mbway",
                "funding_instruments": [{
                    "mbway": { "phone_number": request.phone_number, "country_code": "PT" }
                }]
            });
        }
        _ => {}
    }

    json!({
        "intent": "sale",
        "payer": payer,
        "redirect_urls": {
            "return_url": request.return_url,
            "cancel_url": request.cancel_url
        },
        "transactions": [{
            "item_list": {
                "items": [{
                    "name": format!("9 Rocks Tours - Booking {}", request.booking_id),
                    "sku": request.tour_id,
                    "price": total,
                    "currency": request.currency,
                    "quantity": 1
                }]
            },
            "amount": { "total": total, "currency": request.currency },
            "description": request.description,
            "custom": request.booking_id
        }]
    })
}

impl PayPalGateway {
    pub fn new(config: &PayPalConfig, currency: &str, timeout: Duration) -> Result<Self, GatewayError> {
        if !config.is_configured() {
            return Err(GatewayError::Unavailable("paypal credentials not set".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            webhook_id: config.webhook_id.clone(),
            api_base: config.api_base().to_string(),
            mode: config.mode.clone(),
            currency: currency.to_string(),
            client,
            timeout_secs: timeout.as_secs(),
            token: RwLock::new(None),
        })
    }

    /// Cached OAuth token, refreshed a minute before expiry. The lock is never
    /// held across the token request.
    async fn access_token(&self) -> Result<String, GatewayError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.value.clone());
                }
            }
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("paypal", response).await);
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse PayPal token: {}", e)))?;

        let value = token.access_token.clone();
        *self.token.write().await = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let token = self.access_token().await?;
        let response = builder
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("paypal", response).await);
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse PayPal response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::PayPal
    }

    fn public_config(&self) -> Value {
        json!({
            "gateway": "paypal",
            "available": true,
            "client_id": self.client_id,
            "mode": self.mode,
            "currency": self.currency
        })
    }

    #[instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError> {
        let builder = self
            .client
            .post(format!("{}/v1/payments/payment", self.api_base))
            .header("PayPal-Request-Id", uuid::Uuid::new_v4().to_string())
            .json(&payment_body(request));
        let payment: PayPalPayment = self.send_json(builder).await?;

        let approval_url = payment
            .links
            .iter()
            .find(|l| l.rel == "approval_url")
            .map(|l| l.href.clone());
        if approval_url.is_none() {
            return Err(GatewayError::InvalidResponse(format!(
                "PayPal payment {} has no approval_url",
                payment.id
            )));
        }

        info!("PayPal payment created: {}", payment.id);
        Ok(CreatedPayment {
            status: payment.status(),
            payment_id: payment.id,
            approval_url,
            client_secret: None,
        })
    }

    #[instrument(skip(self))]
    async fn confirm_payment(
        &self,
        payment_id: &str,
        payer_id: Option<&str>,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let payer_id =
            payer_id.ok_or_else(|| GatewayError::Rejected("payer_id is required to execute a PayPal payment".to_string()))?;
        let builder = self
            .client
            .post(format!("{}/v1/payments/payment/{}/execute", self.api_base, payment_id))
            .json(&json!({ "payer_id": payer_id }));
        let payment: PayPalPayment = self.send_json(builder).await?;
        Ok(payment.into_confirmation())
    }

    async fn fetch_status(&self, payment_id: &str) -> Result<PaymentConfirmation, GatewayError> {
        let builder = self
            .client
            .get(format!("{}/v1/payments/payment/{}", self.api_base, payment_id));
        let payment: PayPalPayment = self.send_json(builder).await?;
        Ok(payment.into_confirmation())
    }

    async fn verify_webhook(&self, headers: &WebhookHeaders, payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
        let webhook_id = self
            .webhook_id
            .as_deref()
            .ok_or_else(|| GatewayError::Unavailable("paypal webhook id not set".to_string()))?;

        let mut body = serde_json::Map::new();
        for (field, header) in TRANSMISSION_HEADERS {
            let value = headers
                .get(header)
                .ok_or_else(|| GatewayError::SignatureInvalid(format!("missing {} header", header)))?;
            body.insert(field.to_string(), Value::String(value.clone()));
        }
        body.insert("webhook_id".to_string(), Value::String(webhook_id.to_string()));
        let event: Value = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::SignatureInvalid(format!("unparseable webhook body: {}", e)))?;
        body.insert("webhook_event".to_string(), event);

        let builder = self
            .client
            .post(format!("{}/v1/notifications/verify-webhook-signature", self.api_base))
            .json(&Value::Object(body));
        let verification: VerificationResponse = self.send_json(builder).await?;

        if verification.verification_status != "SUCCESS" {
            warn!(target: "security", status = %verification.verification_status, "PayPal webhook verification failed");
            return Err(GatewayError::SignatureInvalid(verification.verification_status));
        }
        parse_paypal_event(payload)
    }
}
