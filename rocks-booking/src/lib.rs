pub mod catalog;
pub mod checkout;
pub mod error;
pub mod events;
pub mod mock;
pub mod reconciliation;
pub mod reservation;
pub mod stats;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{TourCatalog, TourUpsert};
pub use checkout::{
    CheckoutRequest, CheckoutSession, CheckoutSettings, PaymentOrchestrator, PaymentOutcome, RecoveryReport,
};
pub use error::BookingError;
pub use events::OccupancyFeed;
pub use mock::{MockIntentGateway, MockRedirectGateway};
pub use reconciliation::{ConfirmationSource, Receipt, ReconcileOutcome, Reconciler};
pub use reservation::{Availability, BookingFilter, ReservationEngine};
pub use stats::{BookingStats, StatsService, TourStats};
pub use sync::{OccupancySync, SyncOptions, SyncReport};
