//! In-process gateways used when no provider credentials are configured and
//! in tests. They keep the same three-phase contract and verify webhooks with
//! the same signature code as the real clients.

use async_trait::async_trait;
use chrono::Utc;
use rocks_core::payment::{
    CreatedPayment, GatewayError, GatewayKind, PaymentConfirmation, PaymentGateway, PaymentRequest, TransactionStatus,
    WebhookEvent, WebhookHeaders,
};
use rocks_core::webhook::{
    parse_paypal_event, parse_stripe_event, sign_raw, stripe_signature_header, verify_raw, verify_stripe_signature,
    PAYPAL_SIGNATURE_HEADER, STRIPE_SIGNATURE_HEADER,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

/// Payer id the redirect mock treats as a refusal.
pub const DECLINING_PAYER: &str = "DECLINE";

const WEBHOOK_TOLERANCE_SECS: u64 = 300;

#[derive(Debug, Clone)]
struct MockPayment {
    booking_id: String,
    status: TransactionStatus,
    transaction_id: Option<String>,
    failure_reason: Option<String>,
}

impl MockPayment {
    fn new(booking_id: &str) -> Self {
        Self {
            booking_id: booking_id.to_string(),
            status: TransactionStatus::Created,
            transaction_id: None,
            failure_reason: None,
        }
    }

    fn confirmation(&self, payment_id: &str) -> PaymentConfirmation {
        PaymentConfirmation {
            payment_id: payment_id.to_string(),
            status: self.status,
            transaction_id: self.transaction_id.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }
}

#[derive(Default)]
struct Ledger(Mutex<HashMap<String, MockPayment>>);

impl Ledger {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, MockPayment>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, payment_id: &str, payment: MockPayment) {
        self.lock().insert(payment_id.to_string(), payment);
    }

    fn get(&self, payment_id: &str) -> Result<MockPayment, GatewayError> {
        self.lock()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("Unknown payment {}", payment_id)))
    }

    fn update<F>(&self, payment_id: &str, f: F) -> Result<MockPayment, GatewayError>
    where
        F: FnOnce(&mut MockPayment),
    {
        let mut payments = self.lock();
        let payment = payments
            .get_mut(payment_id)
            .ok_or_else(|| GatewayError::Rejected(format!("Unknown payment {}", payment_id)))?;
        f(payment);
        Ok(payment.clone())
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_uppercase()
}

// ============================================================================
// Redirect flow
// ============================================================================

/// Redirect-flow stand-in: approval URLs point back at the frontend and
/// execute succeeds for any payer except [`DECLINING_PAYER`].
pub struct MockRedirectGateway {
    webhook_secret: String,
    frontend_url: String,
    payments: Ledger,
}

impl MockRedirectGateway {
    pub fn new(webhook_secret: impl Into<String>, frontend_url: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            frontend_url: frontend_url.into(),
            payments: Ledger::default(),
        }
    }

    /// Builds a sale webhook body and its `paypal-transmission-sig` value.
    pub fn signed_event(
        &self,
        event_type: &str,
        payment_id: &str,
        booking_id: &str,
    ) -> Result<(Vec<u8>, String), GatewayError> {
        let sale_id = self
            .payments
            .get(payment_id)
            .ok()
            .and_then(|p| p.transaction_id)
            .unwrap_or_else(|| format!("TXN-{}", short_id()));
        let payload = json!({
            "id": format!("WH-{}", short_id()),
            "event_type": event_type,
            "resource": {
                "id": sale_id,
                "parent_payment": payment_id,
                "custom": booking_id,
                "state": "completed",
            }
        })
        .to_string()
        .into_bytes();
        let signature = sign_raw(&self.webhook_secret, &payload)?;
        Ok((payload, signature))
    }
}

#[async_trait]
impl PaymentGateway for MockRedirectGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::PayPal
    }

    fn public_config(&self) -> serde_json::Value {
        json!({
            "gateway": "paypal",
            "available": true,
            "mode": "mock",
            "client_id": "MOCK_CLIENT_ID",
        })
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError> {
        if request.amount <= Decimal::ZERO {
            return Err(GatewayError::Rejected("Amount must be positive".to_string()));
        }
        let payment_id = format!("PAY-{}", short_id());
        self.payments.insert(&payment_id, MockPayment::new(&request.booking_id));
        info!(payment_id = %payment_id, booking_id = %request.booking_id, "Mock redirect payment created");

        Ok(CreatedPayment {
            approval_url: Some(format!(
                "{}/payment/mock-approve?paymentId={}&booking_id={}",
                self.frontend_url.trim_end_matches('/'),
                payment_id,
                request.booking_id
            )),
            payment_id,
            status: TransactionStatus::Created,
            client_secret: None,
        })
    }

    async fn confirm_payment(
        &self,
        payment_id: &str,
        payer_id: Option<&str>,
    ) -> Result<PaymentConfirmation, GatewayError> {
        let payer_id = payer_id.ok_or_else(|| GatewayError::Rejected("payer_id is required".to_string()))?;
        let payment = self.payments.update(payment_id, |p| {
            if p.status.is_terminal() {
                return;
            }
            if payer_id == DECLINING_PAYER {
                p.status = TransactionStatus::Failed;
                p.failure_reason = Some("Payment declined by payer".to_string());
            } else {
                p.status = TransactionStatus::Completed;
                p.transaction_id = Some(format!("TXN-{}", short_id()));
            }
        })?;
        Ok(payment.confirmation(payment_id))
    }

    async fn fetch_status(&self, payment_id: &str) -> Result<PaymentConfirmation, GatewayError> {
        Ok(self.payments.get(payment_id)?.confirmation(payment_id))
    }

    async fn verify_webhook(&self, headers: &WebhookHeaders, payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
        let signature = headers
            .get(PAYPAL_SIGNATURE_HEADER)
            .ok_or_else(|| GatewayError::SignatureInvalid("missing transmission signature".to_string()))?;
        verify_raw(&self.webhook_secret, payload, signature)?;
        parse_paypal_event(payload)
    }
}

// ============================================================================
// Intent flow
// ============================================================================

/// Intent-flow stand-in. Intents stay `created` until a test or the demo
/// endpoint settles them with [`MockIntentGateway::mark_succeeded`] or
/// [`MockIntentGateway::mark_failed`].
pub struct MockIntentGateway {
    webhook_secret: String,
    payments: Ledger,
}

impl MockIntentGateway {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            payments: Ledger::default(),
        }
    }

    pub fn mark_succeeded(&self, payment_id: &str) -> bool {
        self.payments
            .update(payment_id, |p| {
                p.status = TransactionStatus::Completed;
                p.transaction_id.get_or_insert_with(|| format!("ch_mock_{}", short_id().to_lowercase()));
            })
            .is_ok()
    }

    pub fn mark_failed(&self, payment_id: &str, reason: &str) -> bool {
        self.payments
            .update(payment_id, |p| {
                p.status = TransactionStatus::Failed;
                p.failure_reason = Some(reason.to_string());
            })
            .is_ok()
    }

    /// Builds a `payment_intent.*` webhook body and a matching
    /// `Stripe-Signature` header value.
    pub fn signed_event(&self, event_type: &str, payment_id: &str, booking_id: &str) -> (Vec<u8>, String) {
        let payment = self.payments.get(payment_id).ok();
        let payload = json!({
            "id": format!("evt_mock_{}", short_id().to_lowercase()),
            "type": event_type,
            "data": {
                "object": {
                    "id": payment_id,
                    "object": "payment_intent",
                    "latest_charge": payment.as_ref().and_then(|p| p.transaction_id.clone()),
                    "metadata": { "booking_id": booking_id },
                    "last_payment_error": payment
                        .as_ref()
                        .and_then(|p| p.failure_reason.clone())
                        .map(|message| json!({ "message": message })),
                }
            }
        })
        .to_string()
        .into_bytes();
        let header = stripe_signature_header(&self.webhook_secret, Utc::now().timestamp(), &payload)
            .unwrap_or_default();
        (payload, header)
    }
}

#[async_trait]
impl PaymentGateway for MockIntentGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    fn public_config(&self) -> serde_json::Value {
        json!({
            "gateway": "stripe",
            "available": true,
            "mode": "mock",
            "publishable_key": "pk_test_mock",
        })
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError> {
        if request.amount < Decimal::new(50, 2) {
            return Err(GatewayError::Rejected("Minimum amount is 0.50 EUR".to_string()));
        }
        let payment_id = format!("pi_mock_{}", short_id().to_lowercase());
        self.payments.insert(&payment_id, MockPayment::new(&request.booking_id));
        info!(payment_id = %payment_id, booking_id = %request.booking_id, "Mock payment intent created");

        Ok(CreatedPayment {
            client_secret: Some(format!("{}_secret_mock", payment_id)),
            payment_id,
            status: TransactionStatus::Created,
            approval_url: None,
        })
    }

    async fn confirm_payment(
        &self,
        payment_id: &str,
        _payer_id: Option<&str>,
    ) -> Result<PaymentConfirmation, GatewayError> {
        self.fetch_status(payment_id).await
    }

    async fn fetch_status(&self, payment_id: &str) -> Result<PaymentConfirmation, GatewayError> {
        Ok(self.payments.get(payment_id)?.confirmation(payment_id))
    }

    async fn verify_webhook(&self, headers: &WebhookHeaders, payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
        let header = headers
            .get(STRIPE_SIGNATURE_HEADER)
            .ok_or_else(|| GatewayError::SignatureInvalid("missing Stripe-Signature header".to_string()))?;
        verify_stripe_signature(
            header,
            payload,
            &self.webhook_secret,
            WEBHOOK_TOLERANCE_SECS,
            Utc::now().timestamp(),
        )?;
        parse_stripe_event(payload)
    }
}
