use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rocks_booking::{CheckoutRequest, CheckoutSession, PaymentOutcome};
use rocks_core::payment::GatewayKind;
use serde::Deserialize;
use serde_json::Value;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ExecutePaymentRequest {
    pub payment_id: String,
    #[serde(default)]
    pub payer_id: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/{gateway}/config", get(gateway_config))
        .route("/payments/{gateway}/create", post(create_payment))
        .route("/payments/{gateway}/execute", post(execute_payment))
        .route("/payments/{gateway}/status/{payment_id}", get(payment_status))
}

pub(crate) fn parse_gateway(gateway: &str) -> Result<GatewayKind, AppError> {
    gateway.parse().map_err(AppError::NotFoundError)
}

/// GET /payments/{gateway}/config
async fn gateway_config(State(state): State<AppState>, Path(gateway): Path<String>) -> Result<Json<Value>, AppError> {
    let kind = parse_gateway(&gateway)?;
    Ok(Json(state.payments.public_config(kind)?))
}

/// POST /payments/{gateway}/create
async fn create_payment(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, AppError> {
    let kind = parse_gateway(&gateway)?;
    Ok(Json(state.payments.create_payment(kind, req).await?))
}

/// POST /payments/{gateway}/execute
///
/// Synchronous confirmation after the customer returns from the gateway.
async fn execute_payment(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    Json(req): Json<ExecutePaymentRequest>,
) -> Result<Json<PaymentOutcome>, AppError> {
    let kind = parse_gateway(&gateway)?;
    let outcome = state
        .payments
        .execute_payment(kind, &req.payment_id, req.payer_id.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// GET /payments/{gateway}/status/{payment_id}
async fn payment_status(
    State(state): State<AppState>,
    Path((gateway, payment_id)): Path<(String, String)>,
) -> Result<Json<PaymentOutcome>, AppError> {
    let kind = parse_gateway(&gateway)?;
    Ok(Json(state.payments.refresh_status(kind, &payment_id).await?))
}
