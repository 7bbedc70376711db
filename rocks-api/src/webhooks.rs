use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use rocks_core::payment::WebhookHeaders;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{error::AppError, payments::parse_gateway, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/{gateway}", post(handle_webhook))
}

fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// POST /webhooks/{gateway}
///
/// The raw body is authenticated before anything in it is trusted. The
/// reply goes out as soon as the signature checks; reconciliation runs in
/// its own task and failures there are only logged.
async fn handle_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let kind = parse_gateway(&gateway)?;
    let event = state
        .payments
        .verify_webhook(kind, &webhook_headers(&headers), &body)
        .await?;

    info!(gateway = %kind, event_id = %event.event_id, kind = ?event.kind, "Webhook received");
    let event_id = event.event_id.clone();

    let payments = state.payments.clone();
    tokio::spawn(async move {
        match payments.process_webhook(kind, event).await {
            Ok(Some(outcome)) => info!(
                booking_id = %outcome.booking_id,
                status = outcome.status.as_str(),
                already_processed = outcome.already_processed,
                "Webhook applied"
            ),
            Ok(None) => {}
            Err(e) => error!(gateway = %kind, error = %e, "Webhook processing failed"),
        }
    });

    Ok((StatusCode::OK, Json(json!({ "received": true, "event_id": event_id }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_headers_are_lowercased() {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", HeaderValue::from_static("t=1,v1=ab"));
        let collected = webhook_headers(&headers);
        assert_eq!(collected.get("stripe-signature").map(String::as_str), Some("t=1,v1=ab"));
    }
}
