pub mod paypal;
pub mod stripe;

pub use paypal::PayPalGateway;
pub use stripe::StripeGateway;

use rocks_core::payment::GatewayError;
use rust_decimal::Decimal;

fn transport_error(e: reqwest::Error, timeout_secs: u64) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(timeout_secs)
    } else {
        GatewayError::Transport(e.to_string())
    }
}

/// 4xx means the provider refused the request; anything else is a provider fault.
async fn error_from_response(provider: &str, response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, status = %status, body = %body, "Gateway returned an error");
    if status.is_client_error() {
        GatewayError::Rejected(format!("{} {}: {}", provider, status, body))
    } else {
        GatewayError::Transport(format!("{} {}", provider, status))
    }
}

fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
