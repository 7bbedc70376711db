use rocks_core::booking::{Booking, BookingPaymentStatus, BookingStatus};
use rocks_core::repository::{load, load_all, Collection, DocumentStore};
use rocks_core::tour::Tour;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::BookingError;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BookingStats {
    pub total_bookings: usize,
    pub confirmed_bookings: usize,
    pub pending_bookings: usize,
    pub cancelled_bookings: usize,
    /// Sum over paid bookings only.
    pub total_revenue: Decimal,
    pub bookings_by_tour: BTreeMap<String, usize>,
    pub bookings_by_date: BTreeMap<String, usize>,
    pub bookings_by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TourStats {
    pub tour_id: String,
    pub tour_name: String,
    pub total_bookings: usize,
    pub total_participants: u64,
    pub unique_dates: usize,
    pub occupied_dates: Vec<String>,
}

impl BookingStats {
    pub fn compute(bookings: &[Booking]) -> Self {
        let mut stats = BookingStats {
            total_bookings: bookings.len(),
            ..Default::default()
        };

        for booking in bookings {
            match booking.status {
                BookingStatus::Confirmed => stats.confirmed_bookings += 1,
                BookingStatus::Pending => stats.pending_bookings += 1,
                BookingStatus::Cancelled => stats.cancelled_bookings += 1,
            }
            if booking.payment_status == BookingPaymentStatus::Paid {
                stats.total_revenue += booking.total_amount;
            }
            *stats.bookings_by_tour.entry(booking.tour_id.clone()).or_default() += 1;
            *stats.bookings_by_date.entry(booking.selected_date.to_string()).or_default() += 1;
            *stats
                .bookings_by_status
                .entry(booking.status.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }
}

impl TourStats {
    /// Cancelled bookings are left out.
    pub fn compute(tour: &Tour, bookings: &[Booking]) -> Self {
        let live: Vec<&Booking> = bookings
            .iter()
            .filter(|b| b.tour_id == tour.id && b.is_live())
            .collect();
        let dates: BTreeSet<String> = live.iter().map(|b| b.selected_date.to_string()).collect();

        TourStats {
            tour_id: tour.id.clone(),
            tour_name: tour.name.clone(),
            total_bookings: live.len(),
            total_participants: live.iter().map(|b| u64::from(b.participants)).sum(),
            unique_dates: dates.len(),
            occupied_dates: tour.occupied_dates.iter().cloned().collect(),
        }
    }
}

pub struct StatsService {
    store: Arc<dyn DocumentStore>,
}

impl StatsService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn global(&self) -> Result<BookingStats, BookingError> {
        let bookings: Vec<Booking> = load_all(&*self.store, Collection::Bookings).await?;
        Ok(BookingStats::compute(&bookings))
    }

    pub async fn for_tour(&self, tour_id: &str) -> Result<TourStats, BookingError> {
        let tour = load::<Tour>(&*self.store, Collection::Tours, tour_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Tour {}", tour_id)))?;
        let bookings: Vec<Booking> = load_all(&*self.store, Collection::Bookings).await?;
        Ok(TourStats::compute(&tour, &bookings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::new_booking;
    use rocks_core::dates::BookingDate;
    use rust_decimal_macros::dec;

    fn booking(tour_id: &str, date: &str, status: BookingStatus, paid: bool) -> Booking {
        let request = new_booking(tour_id, date);
        let mut booking = Booking::pending(&request, BookingDate::parse(date).unwrap(), 2, dec!(100));
        booking.status = status;
        if paid {
            booking.payment_status = BookingPaymentStatus::Paid;
        }
        booking
    }

    #[test]
    fn test_revenue_counts_paid_bookings_only() {
        let bookings = vec![
            booking("t1", "2025-06-01", BookingStatus::Confirmed, true),
            booking("t1", "2025-06-02", BookingStatus::Pending, false),
            booking("t2", "2025-06-01", BookingStatus::Cancelled, false),
        ];
        let stats = BookingStats::compute(&bookings);

        assert_eq!(stats.total_bookings, 3);
        assert_eq!(stats.confirmed_bookings, 1);
        assert_eq!(stats.pending_bookings, 1);
        assert_eq!(stats.cancelled_bookings, 1);
        assert_eq!(stats.total_revenue, dec!(100));
        assert_eq!(stats.bookings_by_tour["t1"], 2);
        assert_eq!(stats.bookings_by_date["2025-06-01"], 2);
        assert_eq!(stats.bookings_by_status["pending"], 1);
    }

    #[test]
    fn test_tour_stats_skip_cancelled() {
        let mut tour = Tour::new("t1", "Fatima Tour", dec!(50), 8);
        tour.occupied_dates.insert("2025-06-01".to_string());
        let bookings = vec![
            booking("t1", "2025-06-01", BookingStatus::Confirmed, true),
            booking("t1", "2025-06-02", BookingStatus::Pending, false),
            booking("t1", "2025-06-03", BookingStatus::Cancelled, false),
            booking("t2", "2025-06-01", BookingStatus::Confirmed, true),
        ];
        let stats = TourStats::compute(&tour, &bookings);

        assert_eq!(stats.total_bookings, 2);
        assert_eq!(stats.total_participants, 4);
        assert_eq!(stats.unique_dates, 2);
        assert_eq!(stats.occupied_dates, vec!["2025-06-01"]);
    }
}
