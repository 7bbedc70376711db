use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::payment::{GatewayError, WebhookEvent, WebhookEventKind};

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const PAYPAL_SIGNATURE_HEADER: &str = "paypal-transmission-sig";

fn mac_for(secret: &str) -> Result<HmacSha256, GatewayError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::SignatureInvalid(format!("unusable secret: {}", e)))
}

/// Hex HMAC-SHA256 of `payload`.
pub fn sign_raw(secret: &str, payload: &[u8]) -> Result<String, GatewayError> {
    let mut mac = mac_for(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_raw(secret: &str, payload: &[u8], signature: &str) -> Result<(), GatewayError> {
    let bytes = hex::decode(signature.trim())
        .map_err(|_| GatewayError::SignatureInvalid("signature is not hex".to_string()))?;
    let mut mac = mac_for(secret)?;
    mac.update(payload);
    mac.verify_slice(&bytes)
        .map_err(|_| GatewayError::SignatureInvalid("signature mismatch".to_string()))
}

/// Builds a `Stripe-Signature` header value (`t=..,v1=..`) for `payload`.
pub fn stripe_signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, GatewayError> {
    let mut mac = mac_for(secret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}

/// Checks a `Stripe-Signature` header: signed payload is `"{t}.{body}"`, any
/// `v1` entry may match, and `t` must be within `tolerance_secs` of `now`.
pub fn verify_stripe_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), GatewayError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", val)) => timestamp = val.parse().ok(),
            Some(("v1", val)) => candidates.push(val),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| GatewayError::SignatureInvalid("missing timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(GatewayError::SignatureInvalid("missing v1 signature".to_string()));
    }
    if (now - timestamp).unsigned_abs() > tolerance_secs {
        return Err(GatewayError::SignatureInvalid("timestamp outside tolerance".to_string()));
    }

    for candidate in candidates {
        let Ok(bytes) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = mac_for(secret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&bytes).is_ok() {
            return Ok(());
        }
    }
    Err(GatewayError::SignatureInvalid("signature mismatch".to_string()))
}

// ============================================================================
// Event payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

/// Parses an already-verified Stripe event body.
pub fn parse_stripe_event(payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
    let event: StripeEvent =
        serde_json::from_slice(payload).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    let object = &event.data.object;

    let kind = match event.event_type.as_str() {
        "payment_intent.succeeded" => WebhookEventKind::PaymentSucceeded,
        "payment_intent.payment_failed" => WebhookEventKind::PaymentFailed,
        "payment_intent.canceled" => WebhookEventKind::PaymentCancelled,
        other => WebhookEventKind::Other(other.to_string()),
    };

    let str_field = |v: &Value| v.as_str().map(str::to_string);
    Ok(WebhookEvent {
        event_id: event.id,
        kind,
        payment_id: object.get("id").and_then(str_field),
        transaction_id: object.get("latest_charge").and_then(str_field),
        booking_id: object.pointer("/metadata/booking_id").and_then(str_field),
        failure_reason: object.pointer("/last_payment_error/message").and_then(str_field),
    })
}

#[derive(Debug, Deserialize)]
struct PayPalEvent {
    id: String,
    event_type: String,
    resource: Value,
}

/// Parses an already-verified PayPal event body. Sale events reference the
/// payment through `parent_payment`.
pub fn parse_paypal_event(payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
    let event: PayPalEvent =
        serde_json::from_slice(payload).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    let resource = &event.resource;

    let kind = match event.event_type.as_str() {
        "PAYMENT.SALE.COMPLETED" => WebhookEventKind::PaymentSucceeded,
        "PAYMENT.SALE.DENIED" => WebhookEventKind::PaymentFailed,
        "PAYMENTS.PAYMENT.CANCELLED" => WebhookEventKind::PaymentCancelled,
        other => WebhookEventKind::Other(other.to_string()),
    };

    let str_field = |v: &Value| v.as_str().map(str::to_string);
    let payment_id = resource
        .get("parent_payment")
        .and_then(str_field)
        .or_else(|| resource.get("id").and_then(str_field));
    let transaction_id = if resource.get("parent_payment").is_some() {
        resource.get("id").and_then(str_field)
    } else {
        None
    };

    Ok(WebhookEvent {
        event_id: event.id,
        kind,
        payment_id,
        transaction_id,
        booking_id: resource.get("custom").and_then(str_field),
        failure_reason: resource.get("reason_code").and_then(str_field),
    })
}
