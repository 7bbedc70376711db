use chrono::Utc;
use rocks_core::booking::{Booking, BookingPaymentStatus, BookingStatus};
use rocks_core::payment::{
    GatewayError, GatewayKind, PaymentConfirmation, PaymentGateway, PaymentMethod, PaymentRequest,
    PaymentTransaction, TransactionStatus, WebhookEvent, WebhookEventKind, WebhookHeaders,
};
use rocks_core::repository::{load, load_all, load_where, to_document, Collection, DocumentStore};
use rocks_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::reconciliation::{ConfirmationSource, Receipt, ReconcileOutcome, Reconciler};

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub frontend_url: String,
    pub gateway_timeout: Duration,
}

/// Customer request to start paying for a booking. The amount is never
/// taken from here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    pub booking_id: String,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub transaction_id: String,
    pub payment_id: String,
    pub approval_url: Option<String>,
    pub client_secret: Option<String>,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
}

/// Result of applying a gateway answer to local state.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub booking_id: String,
    pub payment_id: String,
    pub status: TransactionStatus,
    pub transaction_id: Option<String>,
    pub already_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconcileOutcome>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Front-end for both gateway flows. Every gateway call is bounded by
/// `gateway_timeout`; outcomes funnel into the [`Reconciler`].
pub struct PaymentOrchestrator {
    store: Arc<dyn DocumentStore>,
    reconciler: Arc<Reconciler>,
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
    settings: CheckoutSettings,
}

impl PaymentOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, reconciler: Arc<Reconciler>, settings: CheckoutSettings) -> Self {
        Self {
            store,
            reconciler,
            gateways: HashMap::new(),
            settings,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    fn gateway(&self, kind: GatewayKind) -> Result<&Arc<dyn PaymentGateway>, BookingError> {
        self.gateways
            .get(&kind)
            .ok_or_else(|| BookingError::Gateway(GatewayError::Unavailable(format!("{} is not configured", kind))))
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.settings.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.settings.gateway_timeout.as_secs())),
        }
    }

    pub fn public_config(&self, kind: GatewayKind) -> Result<serde_json::Value, BookingError> {
        Ok(self.gateway(kind)?.public_config())
    }

    async fn find_transaction(&self, kind: GatewayKind, payment_id: &str) -> Result<PaymentTransaction, BookingError> {
        let matches: Vec<PaymentTransaction> = load_where(
            &*self.store,
            Collection::PaymentTransactions,
            "payment_id",
            &json!(payment_id),
        )
        .await?;
        matches
            .into_iter()
            .find(|tx| tx.gateway == kind)
            .ok_or_else(|| BookingError::NotFound(format!("Payment {}", payment_id)))
    }

    async fn booking(&self, booking_id: &str) -> Result<Booking, BookingError> {
        load::<Booking>(&*self.store, Collection::Bookings, booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Booking {}", booking_id)))
    }

    /// Phase one: open a payment for a pending booking.
    #[instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    pub async fn create_payment(
        &self,
        kind: GatewayKind,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, BookingError> {
        let gateway = self.gateway(kind)?.clone();
        let booking = self.booking(&request.booking_id).await?;
        if booking.status != BookingStatus::Pending || booking.payment_status == BookingPaymentStatus::Paid {
            return Err(BookingError::Validation(format!(
                "Booking {} is {} and cannot be paid",
                booking.id, booking.status
            )));
        }

        let method = request
            .payment_method
            .or(booking.payment_method.filter(|m| kind.supports(*m)))
            .unwrap_or_else(|| kind.default_method());
        if !kind.supports(method) {
            return Err(BookingError::Validation(format!("{} does not support {:?}", kind, method)));
        }
        let phone_number = request.phone_number.clone().or_else(|| booking.customer_phone.clone());
        if method == PaymentMethod::Mbway {
            match &phone_number {
                Some(phone) => debug!(phone = %Masked(phone), "MB WAY payment requested"),
                None => return Err(BookingError::Validation("MB WAY payments need a phone number".to_string())),
            }
        }

        let frontend = self.settings.frontend_url.trim_end_matches('/');
        let payment_request = PaymentRequest {
            booking_id: booking.id.clone(),
            tour_id: booking.tour_id.clone(),
            amount: booking.total_amount,
            currency: self.settings.currency.clone(),
            description: format!("Tour booking payment for {}", booking.customer_name),
            payment_method: method,
            return_url: request
                .return_url
                .unwrap_or_else(|| format!("{}/payment/success?booking_id={}", frontend, booking.id)),
            cancel_url: request
                .cancel_url
                .unwrap_or_else(|| format!("{}/payment/cancel?booking_id={}", frontend, booking.id)),
            phone_number,
        };

        let created = match self.bounded(gateway.create_payment(&payment_request)).await {
            Ok(created) => created,
            Err(e) => {
                if matches!(e, GatewayError::Rejected(_)) {
                    self.reconciler
                        .handle_failed_payment(&booking.id, None, TransactionStatus::Failed, Some(&e.to_string()))
                        .await?;
                }
                warn!(gateway = %kind, error = %e, "Payment creation failed");
                return Err(e.into());
            }
        };

        let tx = PaymentTransaction {
            id: Uuid::new_v4().to_string(),
            payment_id: created.payment_id.clone(),
            gateway: kind,
            booking_id: booking.id.clone(),
            tour_id: booking.tour_id.clone(),
            amount: booking.total_amount,
            currency: self.settings.currency.clone(),
            payment_method: method,
            status: created.status,
            transaction_id: None,
            approval_url: created.approval_url.clone(),
            client_secret: created.client_secret.clone(),
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
            webhook_received_at: None,
        };
        let doc = to_document(Collection::PaymentTransactions, &tx.id, &tx)?;
        self.store.set(Collection::PaymentTransactions, &tx.id, doc).await?;

        self.store
            .update(
                Collection::Bookings,
                &booking.id,
                json!({
                    "payment_transaction_id": tx.id,
                    "payment_method": method,
                    "payment_status": BookingPaymentStatus::Pending,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;

        info!(gateway = %kind, payment_id = %tx.payment_id, amount = %tx.amount, "Payment created");
        Ok(CheckoutSession {
            transaction_id: tx.id,
            payment_id: tx.payment_id,
            approval_url: tx.approval_url,
            client_secret: tx.client_secret,
            status: tx.status,
            amount: tx.amount,
            currency: tx.currency,
        })
    }

    /// Phase two, synchronous path: execute (redirect flow) or check the
    /// intent (intent flow), then reconcile.
    #[instrument(skip(self, payer_id))]
    pub async fn execute_payment(
        &self,
        kind: GatewayKind,
        payment_id: &str,
        payer_id: Option<&str>,
    ) -> Result<PaymentOutcome, BookingError> {
        let gateway = self.gateway(kind)?.clone();
        let tx = self.find_transaction(kind, payment_id).await?;

        if tx.status == TransactionStatus::Completed {
            // A webhook got here first; re-running reconciliation repairs any partial state.
            let reference = tx.transaction_id.clone();
            let reconciliation = self.reconcile(&tx, reference.clone(), ConfirmationSource::SyncConfirm).await?;
            return Ok(PaymentOutcome {
                booking_id: tx.booking_id,
                payment_id: tx.payment_id,
                status: TransactionStatus::Completed,
                transaction_id: reference,
                already_processed: true,
                reconciliation: Some(reconciliation),
            });
        }

        let confirmation = match self.bounded(gateway.confirm_payment(payment_id, payer_id)).await {
            Ok(confirmation) => confirmation,
            Err(GatewayError::Rejected(reason)) => {
                self.reconciler
                    .handle_failed_payment(&tx.booking_id, Some(&tx.id), TransactionStatus::Failed, Some(&reason))
                    .await?;
                return Err(GatewayError::Rejected(reason).into());
            }
            Err(e) => {
                // Money may have moved; leave it to the status poll and the sync job.
                warn!(gateway = %kind, payment_id, error = %e, "Payment confirmation did not complete");
                return Err(e.into());
            }
        };

        self.apply_confirmation(&tx, confirmation, ConfirmationSource::SyncConfirm).await
    }

    /// Polls the gateway and applies a terminal answer.
    pub async fn refresh_status(&self, kind: GatewayKind, payment_id: &str) -> Result<PaymentOutcome, BookingError> {
        let gateway = self.gateway(kind)?.clone();
        let tx = self.find_transaction(kind, payment_id).await?;
        if tx.status.is_terminal() {
            return Ok(PaymentOutcome {
                booking_id: tx.booking_id,
                payment_id: tx.payment_id,
                status: tx.status,
                transaction_id: tx.transaction_id,
                already_processed: true,
                reconciliation: None,
            });
        }

        let confirmation = self.bounded(gateway.fetch_status(payment_id)).await?;
        self.apply_confirmation(&tx, confirmation, ConfirmationSource::StatusPoll).await
    }

    async fn reconcile(
        &self,
        tx: &PaymentTransaction,
        settlement_reference: Option<String>,
        source: ConfirmationSource,
    ) -> Result<ReconcileOutcome, BookingError> {
        let booking = self.booking(&tx.booking_id).await?;
        if tx.created_at < booking.created_at {
            // The slot was released and re-reserved after this payment started.
            warn!(payment_id = %tx.payment_id, booking_id = %booking.id, "Payment predates the current booking");
            return Err(BookingError::InvalidTransition {
                from: BookingStatus::Cancelled.to_string(),
                to: BookingStatus::Confirmed.to_string(),
            });
        }
        let receipt = Receipt {
            transaction_key: Some(tx.id.clone()),
            settlement_reference,
            source,
        };
        self.reconciler
            .handle_successful_payment(&tx.booking_id, &tx.tour_id, &booking.selected_date, &receipt)
            .await
    }

    async fn apply_confirmation(
        &self,
        tx: &PaymentTransaction,
        confirmation: PaymentConfirmation,
        source: ConfirmationSource,
    ) -> Result<PaymentOutcome, BookingError> {
        let mut outcome = PaymentOutcome {
            booking_id: tx.booking_id.clone(),
            payment_id: tx.payment_id.clone(),
            status: confirmation.status,
            transaction_id: confirmation.transaction_id.clone(),
            already_processed: false,
            reconciliation: None,
        };

        match confirmation.status {
            TransactionStatus::Completed => {
                let reconciliation = self.reconcile(tx, confirmation.transaction_id, source).await?;
                outcome.already_processed = reconciliation.already_processed;
                outcome.reconciliation = Some(reconciliation);
            }
            TransactionStatus::Failed | TransactionStatus::Cancelled => {
                self.reconciler
                    .handle_failed_payment(
                        &tx.booking_id,
                        Some(&tx.id),
                        confirmation.status,
                        confirmation.failure_reason.as_deref(),
                    )
                    .await?;
            }
            status @ (TransactionStatus::Created | TransactionStatus::Approved) => {
                if status != tx.status && !tx.status.is_terminal() {
                    self.store
                        .update(Collection::PaymentTransactions, &tx.id, json!({ "status": status }))
                        .await?;
                }
                debug!(payment_id = %tx.payment_id, status = status.as_str(), "Payment not settled yet");
            }
        }
        Ok(outcome)
    }

    /// Authenticates a webhook delivery. Nothing is written on failure.
    pub async fn verify_webhook(
        &self,
        kind: GatewayKind,
        headers: &WebhookHeaders,
        payload: &[u8],
    ) -> Result<WebhookEvent, BookingError> {
        let gateway = self.gateway(kind)?.clone();
        match self.bounded(gateway.verify_webhook(headers, payload)).await {
            Ok(event) => Ok(event),
            Err(GatewayError::SignatureInvalid(reason)) => {
                warn!(target: "security", gateway = %kind, reason = %reason, "Rejected webhook with invalid signature");
                Err(BookingError::SignatureInvalid(reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Applies a verified webhook event. Unhandled event types are ignored.
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn process_webhook(
        &self,
        kind: GatewayKind,
        event: WebhookEvent,
    ) -> Result<Option<PaymentOutcome>, BookingError> {
        let status = match &event.kind {
            WebhookEventKind::PaymentSucceeded => TransactionStatus::Completed,
            WebhookEventKind::PaymentFailed => TransactionStatus::Failed,
            WebhookEventKind::PaymentCancelled => TransactionStatus::Cancelled,
            WebhookEventKind::Other(event_type) => {
                debug!(gateway = %kind, event_type = %event_type, "Ignoring webhook event");
                return Ok(None);
            }
        };
        let payment_id = event
            .payment_id
            .clone()
            .ok_or_else(|| BookingError::Validation("Webhook event carries no payment id".to_string()))?;

        let tx = self.find_transaction(kind, &payment_id).await?;
        if let Some(booking_id) = event.booking_id.as_deref() {
            if booking_id != tx.booking_id {
                warn!(target: "security", payment_id = %payment_id, "Webhook booking_id does not match transaction; using transaction");
            }
        }

        self.store
            .update(
                Collection::PaymentTransactions,
                &tx.id,
                json!({ "webhook_received_at": Utc::now() }),
            )
            .await?;

        let confirmation = PaymentConfirmation {
            payment_id,
            status,
            transaction_id: event.transaction_id.clone(),
            failure_reason: event.failure_reason.clone(),
        };
        self.apply_confirmation(&tx, confirmation, ConfirmationSource::Webhook)
            .await
            .map(Some)
    }

    /// Polls every non-terminal transaction older than `older_than`. Repairs
    /// payments whose webhook never arrived.
    pub async fn recover_stale_payments(&self, older_than: Duration) -> Result<RecoveryReport, BookingError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let transactions: Vec<PaymentTransaction> = load_all(&*self.store, Collection::PaymentTransactions).await?;
        let mut report = RecoveryReport::default();

        for tx in transactions
            .into_iter()
            .filter(|tx| !tx.status.is_terminal() && tx.created_at < cutoff)
        {
            let Some(gateway) = self.gateways.get(&tx.gateway).cloned() else {
                continue;
            };
            report.checked += 1;

            let result = match self.bounded(gateway.fetch_status(&tx.payment_id)).await {
                Ok(confirmation) => self.apply_confirmation(&tx, confirmation, ConfirmationSource::Recovery).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(outcome) if outcome.status == TransactionStatus::Completed => report.completed += 1,
                Ok(outcome) if outcome.status.is_terminal() => report.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(payment_id = %tx.payment_id, error = %e, "Stale payment check failed");
                    report.errors.push(format!("{}: {}", tx.payment_id, e));
                }
            }
        }

        if report.checked > 0 {
            info!(
                checked = report.checked,
                completed = report.completed,
                failed = report.failed,
                "Stale payment recovery finished"
            );
        }
        Ok(report)
    }

    /// Newest first.
    pub async fn list_transactions(&self) -> Result<Vec<PaymentTransaction>, BookingError> {
        let mut transactions: Vec<PaymentTransaction> =
            load_all(&*self.store, Collection::PaymentTransactions).await?;
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OccupancyFeed;
    use crate::mock::{MockIntentGateway, MockRedirectGateway};
    use crate::reservation::ReservationEngine;
    use crate::testing::{new_booking, seed_tour};
    use rocks_core::tour::Tour;
    use rocks_store::MemoryStore;
    use rust_decimal_macros::dec;

    struct Harness {
        store: MemoryStore,
        engine: ReservationEngine,
        orchestrator: PaymentOrchestrator,
        intents: Arc<MockIntentGateway>,
    }

    const WEBHOOK_SECRET: &str = "whsec_test";

    async fn harness() -> Harness {
        let store = MemoryStore::new();
        seed_tour(&store, "tour-fatima", dec!(65), 10).await;
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let feed = OccupancyFeed::default();
        let reconciler = Arc::new(Reconciler::new(shared.clone(), feed.clone()));
        let intents = Arc::new(MockIntentGateway::new(WEBHOOK_SECRET));
        let orchestrator = PaymentOrchestrator::new(
            shared.clone(),
            reconciler,
            CheckoutSettings {
                currency: "EUR".to_string(),
                frontend_url: "http://localhost:3000".to_string(),
                gateway_timeout: Duration::from_secs(5),
            },
        )
        .with_gateway(Arc::new(MockRedirectGateway::new(WEBHOOK_SECRET, "http://localhost:3000")))
        .with_gateway(intents.clone());

        Harness {
            engine: ReservationEngine::new(shared, feed),
            store,
            orchestrator,
            intents,
        }
    }

    fn checkout(booking_id: &str) -> CheckoutRequest {
        CheckoutRequest {
            booking_id: booking_id.to_string(),
            ..Default::default()
        }
    }

    async fn assert_settled(h: &Harness, booking_id: &str) {
        let booking = h.engine.get_booking(booking_id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment_status, BookingPaymentStatus::Paid);
        let tour: Tour = load(&h.store, Collection::Tours, "tour-fatima").await.unwrap().unwrap();
        assert_eq!(tour.occupied_dates.len(), 1);
        assert!(tour.occupied_dates.contains(&booking.selected_date.to_string()));
    }

    #[tokio::test]
    async fn test_redirect_flow_confirms_booking() {
        let h = harness().await;
        let booking = h.engine.reserve(new_booking("tour-fatima", "2025-06-01")).await.unwrap();

        let session = h
            .orchestrator
            .create_payment(GatewayKind::PayPal, checkout(&booking.id))
            .await
            .unwrap();
        assert!(session.payment_id.starts_with("PAY-"));
        assert!(session.approval_url.is_some());
        assert_eq!(session.amount, dec!(130));

        let outcome = h
            .orchestrator
            .execute_payment(GatewayKind::PayPal, &session.payment_id, Some("PAYER-1"))
            .await
            .unwrap();
        assert_eq!(outcome.status, TransactionStatus::Completed);
        assert!(!outcome.already_processed);
        assert_settled(&h, &booking.id).await;

        // A second execute is a no-op.
        let again = h
            .orchestrator
            .execute_payment(GatewayKind::PayPal, &session.payment_id, Some("PAYER-1"))
            .await
            .unwrap();
        assert!(again.already_processed);
    }

    #[tokio::test]
    async fn test_declined_payment_keeps_booking_pending() {
        let h = harness().await;
        let booking = h.engine.reserve(new_booking("tour-fatima", "2025-06-01")).await.unwrap();
        let session = h
            .orchestrator
            .create_payment(GatewayKind::PayPal, checkout(&booking.id))
            .await
            .unwrap();

        let outcome = h
            .orchestrator
            .execute_payment(GatewayKind::PayPal, &session.payment_id, Some("DECLINE"))
            .await
            .unwrap();
        assert_eq!(outcome.status, TransactionStatus::Failed);

        let pending = h.engine.get_booking(&booking.id).await.unwrap();
        assert_eq!(pending.status, BookingStatus::Pending);
        assert_eq!(pending.payment_status, BookingPaymentStatus::Failed);

        // The customer can try again with a fresh payment.
        assert!(h
            .orchestrator
            .create_payment(GatewayKind::PayPal, checkout(&booking.id))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_webhook_then_confirm_matches_confirm_then_webhook() {
        for webhook_first in [true, false] {
            let h = harness().await;
            let booking = h.engine.reserve(new_booking("tour-fatima", "2025-06-01")).await.unwrap();
            let session = h
                .orchestrator
                .create_payment(GatewayKind::Stripe, checkout(&booking.id))
                .await
                .unwrap();
            assert!(session.client_secret.is_some());
            h.intents.mark_succeeded(&session.payment_id);

            let (payload, signature) = h.intents.signed_event("payment_intent.succeeded", &session.payment_id, &booking.id);
            let mut headers = WebhookHeaders::new();
            headers.insert("stripe-signature".to_string(), signature);

            let deliver_webhook = || async {
                let event = h
                    .orchestrator
                    .verify_webhook(GatewayKind::Stripe, &headers, &payload)
                    .await
                    .unwrap();
                h.orchestrator.process_webhook(GatewayKind::Stripe, event).await.unwrap()
            };

            if webhook_first {
                deliver_webhook().await;
                let confirm = h
                    .orchestrator
                    .execute_payment(GatewayKind::Stripe, &session.payment_id, None)
                    .await
                    .unwrap();
                assert!(confirm.already_processed);
            } else {
                h.orchestrator
                    .execute_payment(GatewayKind::Stripe, &session.payment_id, None)
                    .await
                    .unwrap();
                let outcome = deliver_webhook().await.unwrap();
                assert!(outcome.already_processed);
            }

            assert_settled(&h, &booking.id).await;
            let tx = h.orchestrator.list_transactions().await.unwrap().remove(0);
            assert_eq!(tx.status, TransactionStatus::Completed);
            assert!(tx.webhook_received_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_bad_signature_changes_nothing() {
        let h = harness().await;
        let booking = h.engine.reserve(new_booking("tour-fatima", "2025-06-01")).await.unwrap();
        let session = h
            .orchestrator
            .create_payment(GatewayKind::Stripe, checkout(&booking.id))
            .await
            .unwrap();

        let (payload, _) = h.intents.signed_event("payment_intent.succeeded", &session.payment_id, &booking.id);
        let mut headers = WebhookHeaders::new();
        headers.insert("stripe-signature".to_string(), "t=1,v1=deadbeef".to_string());

        let result = h.orchestrator.verify_webhook(GatewayKind::Stripe, &headers, &payload).await;
        assert!(matches!(result, Err(BookingError::SignatureInvalid(_))));

        let untouched = h.engine.get_booking(&booking.id).await.unwrap();
        assert_eq!(untouched.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_amount_comes_from_booking() {
        let h = harness().await;
        let mut request = new_booking("tour-fatima", "2025-06-03");
        request.participants = 3;
        let booking = h.engine.reserve(request).await.unwrap();

        let session = h
            .orchestrator
            .create_payment(GatewayKind::Stripe, checkout(&booking.id))
            .await
            .unwrap();
        assert_eq!(session.amount, dec!(195));
        assert_eq!(session.currency, "EUR");
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let h = harness().await;
        let booking = h.engine.reserve(new_booking("tour-fatima", "2025-06-01")).await.unwrap();
        let result = h
            .orchestrator
            .create_payment(
                GatewayKind::Stripe,
                CheckoutRequest {
                    booking_id: booking.id.clone(),
                    payment_method: Some(PaymentMethod::Multibanco),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_stale_payment_recovery_applies_terminal_status() {
        let h = harness().await;
        let booking = h.engine.reserve(new_booking("tour-fatima", "2025-06-01")).await.unwrap();
        let session = h
            .orchestrator
            .create_payment(GatewayKind::Stripe, checkout(&booking.id))
            .await
            .unwrap();
        h.intents.mark_succeeded(&session.payment_id);

        let report = h.orchestrator.recover_stale_payments(Duration::ZERO).await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.completed, 1);
        assert_settled(&h, &booking.id).await;

        let second = h.orchestrator.recover_stale_payments(Duration::ZERO).await.unwrap();
        assert_eq!(second.checked, 0);
    }

    #[tokio::test]
    async fn test_refresh_status_of_unknown_payment_is_not_found() {
        let h = harness().await;
        let result = h.orchestrator.refresh_status(GatewayKind::PayPal, "PAY-missing").await;
        assert!(matches!(result, Err(BookingError::NotFound(_))));
    }
}
