use async_trait::async_trait;
use rocks_core::payment::{
    CreatedPayment, GatewayError, GatewayKind, PaymentConfirmation, PaymentGateway, PaymentRequest, TransactionStatus,
    WebhookEvent, WebhookHeaders,
};
use rocks_core::webhook::{parse_stripe_event, verify_stripe_signature, STRIPE_SIGNATURE_HEADER};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

use super::{error_from_response, transport_error};
use crate::app_config::StripeConfig;

const STRIPE_API: &str = "https://api.stripe.com";
/// Stripe refuses intents below 0.50 EUR.
pub const MINIMUM_AMOUNT_CENTS: i64 = 50;

/// Intent-flow gateway over the Stripe REST API.
pub struct StripeGateway {
    secret_key: String,
    publishable_key: Option<String>,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
    currency: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    status: String,
    client_secret: Option<String>,
    latest_charge: Option<String>,
    last_payment_error: Option<StripeErrorDetail>,
    cancellation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

pub fn to_cents(amount: Decimal) -> Result<i64, GatewayError> {
    let cents = (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::Rejected(format!("Amount out of range: {}", amount)))?;
    if cents < MINIMUM_AMOUNT_CENTS {
        return Err(GatewayError::Rejected("Minimum amount is 0.50 EUR".to_string()));
    }
    Ok(cents)
}

fn status_of(intent: &PaymentIntentResponse) -> TransactionStatus {
    match intent.status.as_str() {
        "succeeded" => TransactionStatus::Completed,
        "processing" | "requires_capture" => TransactionStatus::Approved,
        "canceled" => TransactionStatus::Cancelled,
        "requires_payment_method" if intent.last_payment_error.is_some() => TransactionStatus::Failed,
        _ => TransactionStatus::Created,
    }
}

impl StripeGateway {
    pub fn new(config: &StripeConfig, currency: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let secret_key = config
            .secret_key
            .clone()
            .filter(|_| config.is_configured())
            .ok_or_else(|| GatewayError::Unavailable("stripe secret key not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            secret_key,
            publishable_key: config.publishable_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            tolerance_secs: config.webhook_tolerance_seconds,
            currency: currency.to_string(),
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    fn is_live(&self) -> bool {
        self.secret_key.starts_with("sk_live")
    }

    async fn retrieve_intent(&self, payment_id: &str) -> Result<PaymentIntentResponse, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", STRIPE_API, payment_id))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("stripe", response).await);
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse Stripe response: {}", e)))
    }

    fn confirmation(intent: PaymentIntentResponse) -> PaymentConfirmation {
        let status = status_of(&intent);
        let failure_reason = intent
            .last_payment_error
            .and_then(|e| e.message)
            .or(intent.cancellation_reason);
        PaymentConfirmation {
            payment_id: intent.id,
            status,
            transaction_id: intent.latest_charge,
            failure_reason,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    fn public_config(&self) -> serde_json::Value {
        let environment = if self.is_live() { "PRODUCTION" } else { "TEST" };
        serde_json::json!({
            "gateway": "stripe",
            "available": true,
            "publishable_key": self.publishable_key,
            "currency": self.currency,
            "mode": if self.is_live() { "live" } else { "test" },
            "google_pay": {
                "environment": environment,
                "merchant_name": "9 Rocks Tours",
                "gateway": "stripe",
                "supported_networks": ["AMEX", "DISCOVER", "JCB", "MASTERCARD", "VISA"],
                "supported_methods": ["PAN_ONLY", "CRYPTOGRAM_3DS"]
            }
        })
    }

    #[instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError> {
        let cents = to_cents(request.amount)?;
        let params = [
            ("amount", cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("automatic_payment_methods[allow_redirects]", "never".to_string()),
            ("capture_method", "automatic".to_string()),
            ("description", request.description.clone()),
            ("metadata[booking_id]", request.booking_id.clone()),
            ("metadata[tour_id]", request.tour_id.clone()),
            ("metadata[source]", "9rocks_tours_payment".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", STRIPE_API))
            .basic_auth(&self.secret_key, Some(""))
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response("stripe", response).await);
        }
        let intent: PaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse Stripe response: {}", e)))?;

        info!("PaymentIntent created: {}", intent.id);
        Ok(CreatedPayment {
            status: status_of(&intent),
            payment_id: intent.id,
            approval_url: None,
            client_secret: intent.client_secret,
        })
    }

    async fn confirm_payment(
        &self,
        payment_id: &str,
        _payer_id: Option<&str>,
    ) -> Result<PaymentConfirmation, GatewayError> {
        // The browser confirms the intent; the server only checks the outcome.
        self.fetch_status(payment_id).await
    }

    async fn fetch_status(&self, payment_id: &str) -> Result<PaymentConfirmation, GatewayError> {
        let intent = self.retrieve_intent(payment_id).await?;
        Ok(Self::confirmation(intent))
    }

    async fn verify_webhook(&self, headers: &WebhookHeaders, payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| GatewayError::Unavailable("stripe webhook secret not set".to_string()))?;
        let header = headers
            .get(STRIPE_SIGNATURE_HEADER)
            .ok_or_else(|| GatewayError::SignatureInvalid("missing Stripe-Signature header".to_string()))?;

        verify_stripe_signature(header, payload, secret, self.tolerance_secs, chrono::Utc::now().timestamp())?;
        parse_stripe_event(payload)
    }
}
