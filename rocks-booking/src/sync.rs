use chrono::{DateTime, Utc};
use rocks_core::booking::{Booking, BookingStatus};
use rocks_core::payment::{PaymentTransaction, TransactionStatus};
use rocks_core::repository::{load, load_all, Collection, DocumentStore, StoreError};
use rocks_core::tour::{Tour, OCCUPIED_DATES_FIELD};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::BookingError;
use crate::reconciliation::{ConfirmationSource, Receipt, Reconciler};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncOptions {
    /// Also remove dates no live booking holds.
    #[serde(default)]
    pub prune: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub tours_scanned: usize,
    pub bookings_scanned: usize,
    /// Bookings repaired by re-running reconciliation.
    pub recovered: Vec<String>,
    pub dates_added: BTreeMap<String, Vec<String>>,
    pub dates_pruned: BTreeMap<String, Vec<String>>,
    /// Confirmed bookings whose tour no longer exists.
    pub orphaned_bookings: Vec<String>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            tours_scanned: 0,
            bookings_scanned: 0,
            recovered: Vec::new(),
            dates_added: BTreeMap::new(),
            dates_pruned: BTreeMap::new(),
            orphaned_bookings: Vec::new(),
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// True when the run found nothing to change.
    pub fn is_noop(&self) -> bool {
        self.recovered.is_empty() && self.dates_added.is_empty() && self.dates_pruned.is_empty()
    }
}

/// Occupancy Sync Job: rebuilds `occupied_dates` from confirmed bookings.
///
/// Dates come from a snapshot of confirmed bookings but each add and each
/// prune re-reads the slot document, so a concurrent release or an in-flight
/// reconciliation is never undone.
pub struct OccupancySync {
    store: Arc<dyn DocumentStore>,
    reconciler: Arc<Reconciler>,
}

impl OccupancySync {
    pub fn new(store: Arc<dyn DocumentStore>, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport, BookingError> {
        let mut report = SyncReport::new();

        self.recover_payments(&mut report).await?;

        let bookings: Vec<Booking> = load_all(&*self.store, Collection::Bookings).await?;
        let tours: Vec<Tour> = load_all(&*self.store, Collection::Tours).await?;
        report.bookings_scanned = bookings.len();
        report.tours_scanned = tours.len();

        let mut confirmed: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for booking in bookings.iter().filter(|b| b.status == BookingStatus::Confirmed) {
            confirmed
                .entry(booking.tour_id.as_str())
                .or_default()
                .insert(booking.selected_date.to_string());
        }

        let known: BTreeSet<&str> = tours.iter().map(|t| t.id.as_str()).collect();
        for booking in bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed && !known.contains(b.tour_id.as_str()))
        {
            warn!(booking_id = %booking.id, tour_id = %booking.tour_id, "Confirmed booking references a missing tour");
            report.orphaned_bookings.push(booking.id.clone());
        }

        for tour in &tours {
            let expected = confirmed.get(tour.id.as_str()).cloned().unwrap_or_default();

            for date in expected.difference(&tour.occupied_dates) {
                match self.restore_date(&tour.id, date).await {
                    Ok(true) => report.dates_added.entry(tour.id.clone()).or_default().push(date.clone()),
                    Ok(false) => {}
                    Err(e) => report.errors.push(format!("{}: add {}: {}", tour.id, date, e)),
                }
            }

            if options.prune {
                for date in tour.occupied_dates.difference(&expected) {
                    match self.prune_date(&tour.id, date).await {
                        Ok(true) => report.dates_pruned.entry(tour.id.clone()).or_default().push(date.clone()),
                        Ok(false) => {}
                        Err(e) => report.errors.push(format!("{}: prune {}: {}", tour.id, date, e)),
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            tours = report.tours_scanned,
            bookings = report.bookings_scanned,
            recovered = report.recovered.len(),
            added = report.dates_added.values().map(Vec::len).sum::<usize>(),
            pruned = report.dates_pruned.values().map(Vec::len).sum::<usize>(),
            orphaned = report.orphaned_bookings.len(),
            errors = report.errors.len(),
            "Occupancy sync finished"
        );
        Ok(report)
    }

    /// Re-runs reconciliation wherever a payment completed but the booking or
    /// the transaction did not follow.
    async fn recover_payments(&self, report: &mut SyncReport) -> Result<(), BookingError> {
        let transactions: Vec<PaymentTransaction> = load_all(&*self.store, Collection::PaymentTransactions).await?;

        for tx in transactions {
            let Some(booking) = load::<Booking>(&*self.store, Collection::Bookings, &tx.booking_id).await? else {
                continue;
            };
            let paid_but_pending = tx.status == TransactionStatus::Completed && !booking.is_settled();
            let settled_but_open = booking.is_settled()
                && booking.payment_transaction_id.as_deref() == Some(tx.id.as_str())
                && !tx.status.is_terminal();
            let current_occupant = tx.created_at >= booking.created_at;
            if !(paid_but_pending || settled_but_open) || !current_occupant || !booking.is_live() {
                continue;
            }

            let receipt = Receipt {
                transaction_key: Some(tx.id.clone()),
                settlement_reference: tx.transaction_id.clone().or_else(|| booking.payment_reference.clone()),
                source: ConfirmationSource::Recovery,
            };
            match self
                .reconciler
                .handle_successful_payment(&booking.id, &booking.tour_id, &booking.selected_date, &receipt)
                .await
            {
                Ok(outcome) if outcome.is_complete() => {
                    info!(booking_id = %booking.id, payment_id = %tx.payment_id, "Recovered partially reconciled payment");
                    report.recovered.push(booking.id.clone());
                }
                Ok(outcome) => report
                    .errors
                    .push(format!("{}: recovery incomplete: {}", booking.id, outcome.failures.join("; "))),
                Err(e) => report.errors.push(format!("{}: recovery failed: {}", booking.id, e)),
            }
        }
        Ok(())
    }

    async fn slot_confirmed(&self, tour_id: &str, date: &str) -> Result<bool, BookingError> {
        let slot = format!("{}_{}", tour_id, date);
        Ok(load::<Booking>(&*self.store, Collection::Bookings, &slot)
            .await?
            .is_some_and(|b| b.status == BookingStatus::Confirmed))
    }

    /// Adds a date from the booking snapshot back to the tour. The slot is
    /// re-read on both sides of the write; a slot released in between gets
    /// its date withdrawn again.
    async fn restore_date(&self, tour_id: &str, date: &str) -> Result<bool, BookingError> {
        if !self.slot_confirmed(tour_id, date).await? {
            return Ok(false);
        }
        if !self
            .store
            .add_to_set(Collection::Tours, tour_id, OCCUPIED_DATES_FIELD, date)
            .await?
        {
            return Ok(false);
        }
        if !self.slot_confirmed(tour_id, date).await? {
            warn!(tour_id, date, "Slot released while its date was being restored");
            self.prune_date(tour_id, date).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Removes a date unless a live booking holds its slot.
    async fn prune_date(&self, tour_id: &str, date: &str) -> Result<bool, BookingError> {
        let slot = format!("{}_{}", tour_id, date);
        if let Some(holder) = load::<Booking>(&*self.store, Collection::Bookings, &slot).await? {
            if holder.is_live() {
                return Ok(false);
            }
        }
        match self
            .store
            .remove_from_set(Collection::Tours, tour_id, OCCUPIED_DATES_FIELD, date)
            .await
        {
            Ok(removed) => Ok(removed),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
