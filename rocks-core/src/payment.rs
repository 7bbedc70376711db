use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Payment provider behind a gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    PayPal,
    Stripe,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::PayPal => "paypal",
            GatewayKind::Stripe => "stripe",
        }
    }

    pub fn default_method(&self) -> PaymentMethod {
        match self {
            GatewayKind::PayPal => PaymentMethod::Paypal,
            GatewayKind::Stripe => PaymentMethod::StripeCard,
        }
    }

    pub fn supports(&self, method: PaymentMethod) -> bool {
        match self {
            GatewayKind::PayPal => matches!(
                method,
                PaymentMethod::Paypal | PaymentMethod::Multibanco | PaymentMethod::Mbway
            ),
            GatewayKind::Stripe => matches!(method, PaymentMethod::StripeCard | PaymentMethod::GooglePay),
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paypal" => Ok(GatewayKind::PayPal),
            "stripe" => Ok(GatewayKind::Stripe),
            other => Err(format!("Unknown payment gateway: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Paypal,
    GooglePay,
    StripeCard,
    Multibanco,
    Mbway,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Created,
    Approved,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }
}

/// One payment attempt against a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub payment_id: String,
    pub gateway: GatewayKind,
    pub booking_id: String,
    pub tour_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub approval_url: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub webhook_received_at: Option<DateTime<Utc>>,
}

/// What a gateway needs to open a payment. The amount always comes from the
/// stored booking.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub booking_id: String,
    pub tour_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub payment_method: PaymentMethod,
    pub return_url: String,
    pub cancel_url: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub status: TransactionStatus,
    pub approval_url: Option<String>,
    pub client_secret: Option<String>,
}

/// Gateway view of a payment after execute or a status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_id: String,
    pub status: TransactionStatus,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed,
    PaymentCancelled,
    Other(String),
}

/// A verified webhook notification.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_id: String,
    pub kind: WebhookEventKind,
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub booking_id: Option<String>,
    pub failure_reason: Option<String>,
}

/// Webhook request headers with lowercase names.
pub type WebhookHeaders = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    Unavailable(String),
    #[error("Payment rejected: {0}")]
    Rejected(String),
    #[error("Gateway call timed out after {0}s")]
    Timeout(u64),
    #[error("Gateway transport error: {0}")]
    Transport(String),
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),
}

/// Three-phase payment provider: create, confirm, observe.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Configuration safe to hand to the browser.
    fn public_config(&self) -> serde_json::Value;

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment, GatewayError>;

    /// Execute (redirect flow) or retrieve-and-check (intent flow).
    async fn confirm_payment(
        &self,
        payment_id: &str,
        payer_id: Option<&str>,
    ) -> Result<PaymentConfirmation, GatewayError>;

    async fn fetch_status(&self, payment_id: &str) -> Result<PaymentConfirmation, GatewayError>;

    /// Authenticates and parses a webhook body. Nothing in the payload may be
    /// trusted before this returns `Ok`.
    async fn verify_webhook(
        &self,
        headers: &WebhookHeaders,
        payload: &[u8],
    ) -> Result<WebhookEvent, GatewayError>;
}
