pub mod booking;
pub mod dates;
pub mod payment;
pub mod repository;
pub mod tour;
pub mod webhook;

pub use booking::{slot_key, Booking, BookingPaymentStatus, BookingStatus, NewBooking};
pub use dates::BookingDate;
pub use payment::{
    CreatedPayment, GatewayError, GatewayKind, PaymentConfirmation, PaymentGateway, PaymentMethod, PaymentRequest,
    PaymentTransaction, TransactionStatus, WebhookEvent, WebhookEventKind, WebhookHeaders,
};
pub use repository::{Collection, DocumentStore, StoreError, StoreResult};
pub use tour::Tour;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
