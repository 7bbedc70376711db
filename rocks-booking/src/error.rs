use rocks_core::payment::GatewayError;
use rocks_core::repository::StoreError;
use rocks_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Date {date} is already reserved for tour {tour_id}")]
    SlotConflict { tour_id: String, date: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(String),

    #[error(transparent)]
    Gateway(GatewayError),

    #[error(transparent)]
    Store(StoreError),

    #[error("Internal service error: {0}")]
    Internal(String),
}

impl From<CoreError> for BookingError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::ValidationError(msg) => BookingError::Validation(msg),
            CoreError::InternalError(msg) => BookingError::Internal(msg),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, key } => BookingError::NotFound(format!("{}/{}", collection, key)),
            other => BookingError::Store(other),
        }
    }
}

impl From<GatewayError> for BookingError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::SignatureInvalid(msg) => BookingError::SignatureInvalid(msg),
            other => BookingError::Gateway(other),
        }
    }
}
