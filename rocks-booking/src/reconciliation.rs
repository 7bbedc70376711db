use chrono::Utc;
use rocks_core::booking::{Booking, BookingPaymentStatus, BookingStatus};
use rocks_core::dates::BookingDate;
use rocks_core::payment::{PaymentTransaction, TransactionStatus};
use rocks_core::repository::{load, Collection, DocumentStore, StoreError};
use rocks_core::tour::OCCUPIED_DATES_FIELD;
use rocks_shared::{OccupancyEvent, OccupancyEventKind};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::error::BookingError;
use crate::events::OccupancyFeed;

/// Which path delivered a payment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    SyncConfirm,
    Webhook,
    StatusPoll,
    Recovery,
}

impl fmt::Display for ConfirmationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfirmationSource::SyncConfirm => "sync_confirm",
            ConfirmationSource::Webhook => "webhook",
            ConfirmationSource::StatusPoll => "status_poll",
            ConfirmationSource::Recovery => "recovery",
        };
        f.write_str(s)
    }
}

/// Proof of a successful payment.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Key of the PaymentTransaction document, when there is one.
    pub transaction_key: Option<String>,
    /// Gateway settlement reference (sale / charge id).
    pub settlement_reference: Option<String>,
    pub source: ConfirmationSource,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileOutcome {
    pub booking_id: String,
    pub date: String,
    pub date_added: bool,
    pub booking_updated: bool,
    pub transaction_updated: bool,
    /// Every step was already applied by an earlier delivery.
    pub already_processed: bool,
    /// Steps that failed after the date was marked occupied.
    pub failures: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Payment Reconciliation Workflow.
///
/// Saga order is occupancy first, then booking, then transaction. Each step
/// is idempotent on its own; the sync job repairs whatever a partial run
/// leaves behind.
pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
    feed: OccupancyFeed,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>, feed: OccupancyFeed) -> Self {
        Self { store, feed }
    }

    #[instrument(skip(self, receipt), fields(source = %receipt.source))]
    pub async fn handle_successful_payment(
        &self,
        booking_id: &str,
        tour_id: &str,
        selected_date: &BookingDate,
        receipt: &Receipt,
    ) -> Result<ReconcileOutcome, BookingError> {
        let date = selected_date.to_string();

        let date_added = match self
            .store
            .add_to_set(Collection::Tours, tour_id, OCCUPIED_DATES_FIELD, &date)
            .await
        {
            Ok(added) => added,
            Err(StoreError::NotFound { .. }) => return Err(BookingError::NotFound(format!("Tour {}", tour_id))),
            Err(e) => return Err(e.into()),
        };

        let mut outcome = ReconcileOutcome {
            booking_id: booking_id.to_string(),
            date: date.clone(),
            date_added,
            ..Default::default()
        };

        match self.confirm_booking(booking_id, receipt).await {
            Ok(updated) => outcome.booking_updated = updated,
            Err(e) => {
                error!(
                    booking_id,
                    tour_id,
                    date = %date,
                    error = %e,
                    "ReconciliationPartialFailure: booking not confirmed"
                );
                outcome.failures.push(format!("booking: {}", e));
            }
        }

        if let Some(key) = receipt.transaction_key.as_deref() {
            match self.complete_transaction(key, receipt).await {
                Ok(updated) => outcome.transaction_updated = updated,
                Err(e) => {
                    error!(
                        booking_id,
                        transaction = key,
                        error = %e,
                        "ReconciliationPartialFailure: transaction not completed"
                    );
                    outcome.failures.push(format!("transaction: {}", e));
                }
            }
        }

        outcome.already_processed = !outcome.date_added
            && !outcome.booking_updated
            && !outcome.transaction_updated
            && outcome.failures.is_empty();

        if outcome.booking_updated {
            info!(booking_id, date = %date, "Booking confirmed and date occupied");
            self.feed.publish(OccupancyEvent::new(
                OccupancyEventKind::Occupied,
                tour_id,
                date,
                booking_id,
            ));
        } else if outcome.already_processed {
            info!(booking_id, "Payment already reconciled");
        }

        Ok(outcome)
    }

    /// Returns `false` when the booking was already settled.
    async fn confirm_booking(&self, booking_id: &str, receipt: &Receipt) -> Result<bool, BookingError> {
        let booking = load::<Booking>(&*self.store, Collection::Bookings, booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Booking {}", booking_id)))?;

        if booking.is_settled() {
            return Ok(false);
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Confirmed.to_string(),
            });
        }

        let now = Utc::now();
        let mut patch = json!({
            "status": BookingStatus::Confirmed,
            "payment_status": BookingPaymentStatus::Paid,
            "date_blocked": true,
            "date_blocked_at": now,
            "updated_at": now,
        });
        if let Some(key) = &receipt.transaction_key {
            patch["payment_transaction_id"] = json!(key);
        }
        if let Some(reference) = &receipt.settlement_reference {
            patch["payment_reference"] = json!(reference);
        }

        self.store.update(Collection::Bookings, booking_id, patch).await?;
        Ok(true)
    }

    /// Returns `false` when the transaction was already completed; the first
    /// `completed_at` wins.
    async fn complete_transaction(&self, key: &str, receipt: &Receipt) -> Result<bool, BookingError> {
        let tx = load::<PaymentTransaction>(&*self.store, Collection::PaymentTransactions, key)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Payment transaction {}", key)))?;

        if tx.status == TransactionStatus::Completed {
            return Ok(false);
        }

        let mut patch = json!({
            "status": TransactionStatus::Completed,
            "completed_at": Utc::now(),
            "failure_reason": null,
        });
        if let Some(reference) = receipt.settlement_reference.as_ref().or(tx.transaction_id.as_ref()) {
            patch["transaction_id"] = json!(reference);
        }

        self.store.update(Collection::PaymentTransactions, key, patch).await?;
        Ok(true)
    }

    /// A refused or abandoned payment. The booking stays pending and keeps
    /// its slot so the customer can pay again.
    #[instrument(skip(self, reason))]
    pub async fn handle_failed_payment(
        &self,
        booking_id: &str,
        transaction_key: Option<&str>,
        status: TransactionStatus,
        reason: Option<&str>,
    ) -> Result<(), BookingError> {
        if let Some(key) = transaction_key {
            match load::<PaymentTransaction>(&*self.store, Collection::PaymentTransactions, key).await? {
                Some(tx) if !tx.status.is_terminal() => {
                    self.store
                        .update(
                            Collection::PaymentTransactions,
                            key,
                            json!({ "status": status, "failure_reason": reason }),
                        )
                        .await?;
                }
                Some(tx) => {
                    info!(transaction = key, status = tx.status.as_str(), "Transaction already terminal");
                }
                None => warn!(transaction = key, "Failed payment references a missing transaction"),
            }
        }

        match load::<Booking>(&*self.store, Collection::Bookings, booking_id).await? {
            Some(booking)
                if booking.status == BookingStatus::Pending
                    && booking.payment_status != BookingPaymentStatus::Paid =>
            {
                self.store
                    .update(
                        Collection::Bookings,
                        booking_id,
                        json!({ "payment_status": BookingPaymentStatus::Failed, "updated_at": Utc::now() }),
                    )
                    .await?;
                warn!(booking_id, reason = reason.unwrap_or("unknown"), "Payment failed; slot kept for retry");
            }
            Some(_) => {}
            None => warn!(booking_id, "Failed payment references a missing booking"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReservationEngine;
    use crate::testing::{new_booking, seed_tour, FlakyStore};
    use rocks_core::payment::{GatewayKind, PaymentMethod};
    use rocks_core::repository::to_document;
    use rocks_core::tour::Tour;
    use rocks_store::MemoryStore;
    use rust_decimal_macros::dec;

    async fn seed_transaction(store: &dyn DocumentStore, booking: &Booking) -> String {
        let tx = PaymentTransaction {
            id: "tx-1".to_string(),
            payment_id: "PAY-1".to_string(),
            gateway: GatewayKind::PayPal,
            booking_id: booking.id.clone(),
            tour_id: booking.tour_id.clone(),
            amount: booking.total_amount,
            currency: "EUR".to_string(),
            payment_method: PaymentMethod::Paypal,
            status: TransactionStatus::Created,
            transaction_id: None,
            approval_url: None,
            client_secret: None,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
            webhook_received_at: None,
        };
        let doc = to_document(Collection::PaymentTransactions, &tx.id, &tx).unwrap();
        store.set(Collection::PaymentTransactions, &tx.id, doc).await.unwrap();
        tx.id
    }

    fn receipt(key: &str, source: ConfirmationSource) -> Receipt {
        Receipt {
            transaction_key: Some(key.to_string()),
            settlement_reference: Some("TXN-1".to_string()),
            source,
        }
    }

    async fn reserved(store: &MemoryStore) -> Booking {
        seed_tour(store, "tour-fatima", dec!(65), 10).await;
        let engine = ReservationEngine::new(Arc::new(store.clone()), OccupancyFeed::default());
        engine.reserve(new_booking("tour-fatima", "2025-06-01")).await.unwrap()
    }

    #[tokio::test]
    async fn test_reconciliation_is_idempotent() {
        let store = MemoryStore::new();
        let booking = reserved(&store).await;
        let key = seed_transaction(&store, &booking).await;
        let reconciler = Reconciler::new(Arc::new(store.clone()), OccupancyFeed::default());

        let first = reconciler
            .handle_successful_payment(
                &booking.id,
                &booking.tour_id,
                &booking.selected_date,
                &receipt(&key, ConfirmationSource::SyncConfirm),
            )
            .await
            .unwrap();
        assert!(first.date_added && first.booking_updated && first.transaction_updated);
        assert!(!first.already_processed);

        let tx_after_first: PaymentTransaction = load(&store, Collection::PaymentTransactions, &key)
            .await
            .unwrap()
            .unwrap();

        let second = reconciler
            .handle_successful_payment(
                &booking.id,
                &booking.tour_id,
                &booking.selected_date,
                &receipt(&key, ConfirmationSource::Webhook),
            )
            .await
            .unwrap();
        assert!(second.already_processed);
        assert!(second.is_complete());

        let tour: Tour = load(&store, Collection::Tours, "tour-fatima").await.unwrap().unwrap();
        assert_eq!(tour.occupied_dates.iter().collect::<Vec<_>>(), vec!["2025-06-01"]);

        let confirmed: Booking = load(&store, Collection::Bookings, &booking.id).await.unwrap().unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, BookingPaymentStatus::Paid);
        assert!(confirmed.date_blocked);
        assert_eq!(confirmed.payment_reference.as_deref(), Some("TXN-1"));

        let tx: PaymentTransaction = load(&store, Collection::PaymentTransactions, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.completed_at, tx_after_first.completed_at);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_not_raised() {
        let memory = MemoryStore::new();
        let booking = reserved(&memory).await;
        let key = seed_transaction(&memory, &booking).await;
        let flaky = FlakyStore::new(memory.clone(), Collection::Bookings);
        let reconciler = Reconciler::new(flaky.clone(), OccupancyFeed::default());

        let outcome = reconciler
            .handle_successful_payment(
                &booking.id,
                &booking.tour_id,
                &booking.selected_date,
                &receipt(&key, ConfirmationSource::Webhook),
            )
            .await
            .unwrap();

        assert!(outcome.date_added);
        assert!(!outcome.booking_updated);
        assert!(outcome.transaction_updated);
        assert_eq!(outcome.failures.len(), 1);

        let pending: Booking = load(&memory, Collection::Bookings, &booking.id).await.unwrap().unwrap();
        assert_eq!(pending.status, BookingStatus::Pending);

        flaky.disarm();
        let retry = reconciler
            .handle_successful_payment(
                &booking.id,
                &booking.tour_id,
                &booking.selected_date,
                &receipt(&key, ConfirmationSource::Recovery),
            )
            .await
            .unwrap();
        assert!(!retry.date_added);
        assert!(retry.booking_updated);
        assert!(!retry.transaction_updated);
    }

    #[tokio::test]
    async fn test_missing_tour_is_not_found() {
        let store = MemoryStore::new();
        let reconciler = Reconciler::new(Arc::new(store), OccupancyFeed::default());
        let date = BookingDate::parse("2025-06-01").unwrap();
        let result = reconciler
            .handle_successful_payment(
                "ghost_2025-06-01",
                "ghost",
                &date,
                &Receipt {
                    transaction_key: None,
                    settlement_reference: None,
                    source: ConfirmationSource::Webhook,
                },
            )
            .await;
        assert!(matches!(result, Err(BookingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_payment_keeps_slot_and_pending_status() {
        let store = MemoryStore::new();
        let booking = reserved(&store).await;
        let key = seed_transaction(&store, &booking).await;
        let reconciler = Reconciler::new(Arc::new(store.clone()), OccupancyFeed::default());

        reconciler
            .handle_failed_payment(&booking.id, Some(&key), TransactionStatus::Failed, Some("card_declined"))
            .await
            .unwrap();

        let failed: Booking = load(&store, Collection::Bookings, &booking.id).await.unwrap().unwrap();
        assert_eq!(failed.status, BookingStatus::Pending);
        assert_eq!(failed.payment_status, BookingPaymentStatus::Failed);

        let tx: PaymentTransaction = load(&store, Collection::PaymentTransactions, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.failure_reason.as_deref(), Some("card_declined"));

        let tour: Tour = load(&store, Collection::Tours, "tour-fatima").await.unwrap().unwrap();
        assert!(tour.occupied_dates.is_empty());
    }
}
