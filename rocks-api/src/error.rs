use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rocks_booking::BookingError;
use rocks_core::payment::GatewayError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{detail}")]
    ConflictError { code: &'static str, detail: String },
    #[error("{0}")]
    InvalidSignature(String),
    #[error("{0}")]
    PaymentRejected(String),
    #[error("{0}")]
    GatewayUnavailable(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::AuthenticationError(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFoundError(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::ConflictError { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::InvalidSignature(_) => (StatusCode::BAD_REQUEST, "invalid_signature"),
            AppError::PaymentRejected(_) => (StatusCode::BAD_REQUEST, "payment_rejected"),
            AppError::GatewayUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "gateway_unavailable"),
            AppError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error"),
            AppError::InternalServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let detail = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::BadGateway(msg) => {
                tracing::warn!("Gateway error: {}", msg);
                msg.clone()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": code,
            "detail": detail,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::SlotConflict { .. } => AppError::ConflictError {
                code: "slot_conflict",
                detail: "date already reserved".to_string(),
            },
            BookingError::NotFound(what) => AppError::NotFoundError(format!("{} not found", what)),
            e @ BookingError::InvalidTransition { .. } => AppError::ConflictError {
                code: "invalid_transition",
                detail: e.to_string(),
            },
            BookingError::SignatureInvalid(msg) => AppError::InvalidSignature(msg),
            BookingError::Gateway(e) => e.into(),
            e @ (BookingError::Store(_) | BookingError::Internal(_)) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(msg) => AppError::PaymentRejected(msg),
            GatewayError::SignatureInvalid(msg) => AppError::InvalidSignature(msg),
            e @ (GatewayError::Timeout(_) | GatewayError::Unavailable(_)) => {
                AppError::GatewayUnavailable(e.to_string())
            }
            e => AppError::BadGateway(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_conflict_maps_to_409() {
        let err: AppError = BookingError::SlotConflict {
            tour_id: "t1".to_string(),
            date: "2025-06-01".to_string(),
        }
        .into();
        assert_eq!(err.status_and_code(), (StatusCode::CONFLICT, "slot_conflict"));
    }

    #[test]
    fn test_gateway_errors_map_by_kind() {
        let timeout: AppError = BookingError::Gateway(GatewayError::Timeout(15)).into();
        assert_eq!(timeout.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);

        let rejected: AppError = BookingError::Gateway(GatewayError::Rejected("declined".into())).into();
        assert_eq!(rejected.status_and_code().0, StatusCode::BAD_REQUEST);

        let transport: AppError = BookingError::Gateway(GatewayError::Transport("reset".into())).into();
        assert_eq!(transport.status_and_code().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_store_errors_hide_details() {
        let err: AppError = BookingError::Internal("db password wrong".into()).into();
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
