use chrono::Utc;
use rocks_core::booking::{slot_key, Booking, BookingStatus, NewBooking};
use rocks_core::dates::BookingDate;
use rocks_core::repository::{load, load_all, to_document, Collection, DocumentStore, StoreError};
use rocks_core::tour::{Tour, OCCUPIED_DATES_FIELD};
use rocks_shared::pii::MaskedEmail;
use rocks_shared::{OccupancyEvent, OccupancyEventKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::events::OccupancyFeed;

/// Slot availability for one tour date.
#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub tour_id: String,
    pub date: String,
    pub is_available: bool,
    pub booking_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub tour_id: Option<String>,
}

/// Date Reservation Engine.
///
/// The only concurrency control is the store's conditional insert on the slot
/// key; nothing here locks.
pub struct ReservationEngine {
    store: Arc<dyn DocumentStore>,
    feed: OccupancyFeed,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn DocumentStore>, feed: OccupancyFeed) -> Self {
        Self { store, feed }
    }

    async fn active_tour(&self, tour_id: &str) -> Result<Tour, BookingError> {
        load::<Tour>(&*self.store, Collection::Tours, tour_id)
            .await?
            .filter(|t| t.active)
            .ok_or_else(|| BookingError::NotFound(format!("Tour {}", tour_id)))
    }

    /// Reserve a tour date for a pending booking.
    #[instrument(skip(self, request), fields(tour_id = %request.tour_id))]
    pub async fn reserve(&self, request: NewBooking) -> Result<Booking, BookingError> {
        let (date, participants) = request.validate()?;

        let tour = self.active_tour(&request.tour_id).await?;
        if participants > tour.max_participants {
            return Err(BookingError::Validation(format!(
                "Tour {} takes at most {} participants",
                tour.id, tour.max_participants
            )));
        }

        let total = tour
            .total_for(participants)
            .ok_or_else(|| BookingError::Validation("total amount out of range".to_string()))?;
        let booking = Booking::pending(&request, date, participants, total);
        let doc = to_document(Collection::Bookings, &booking.id, &booking)?;

        if !self.store.insert_if_absent(Collection::Bookings, &booking.id, doc).await? {
            info!(slot = %booking.id, "Slot already reserved");
            return Err(BookingError::SlotConflict {
                tour_id: booking.tour_id,
                date: date.to_string(),
            });
        }

        info!(
            booking_id = %booking.id,
            customer = %MaskedEmail(&booking.customer_email),
            participants,
            total = %booking.total_amount,
            "Booking reserved"
        );
        self.feed.publish(OccupancyEvent::new(
            OccupancyEventKind::Reserved,
            &booking.tour_id,
            date.to_string(),
            &booking.id,
        ));
        Ok(booking)
    }

    pub async fn get_booking(&self, booking_id: &str) -> Result<Booking, BookingError> {
        load::<Booking>(&*self.store, Collection::Bookings, booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Booking {}", booking_id)))
    }

    /// Administrative cancel: archive the booking, free the slot key and drop
    /// its date from the tour's occupied set.
    #[instrument(skip(self))]
    pub async fn release(&self, booking_id: &str) -> Result<Booking, BookingError> {
        let mut booking = self.get_booking(booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(BookingError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Cancelled.to_string(),
            });
        }

        let slot = booking.slot_key();
        let date = booking.selected_date.to_string();
        let now = Utc::now();
        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(now);
        booking.updated_at = now;
        booking.id = format!("{}_cancelled_{}", slot, Uuid::new_v4().simple());

        let archived = to_document(Collection::Bookings, &booking.id, &booking)?;
        self.store.set(Collection::Bookings, &booking.id, archived).await?;
        // Slot goes before the date: anything that re-reads the slot after
        // adding a date then sees it free.
        self.store.delete(Collection::Bookings, &slot).await?;

        match self
            .store
            .remove_from_set(Collection::Tours, &booking.tour_id, OCCUPIED_DATES_FIELD, &date)
            .await
        {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => {
                warn!(tour_id = %booking.tour_id, "Released booking references a missing tour");
            }
            Err(e) => return Err(e.into()),
        }

        info!(slot = %slot, archived_as = %booking.id, "Booking released");
        self.feed.publish(OccupancyEvent::new(
            OccupancyEventKind::Released,
            &booking.tour_id,
            date,
            &booking.id,
        ));
        Ok(booking)
    }

    pub async fn is_available(&self, tour_id: &str, date: &BookingDate) -> Result<Availability, BookingError> {
        let tour = load::<Tour>(&*self.store, Collection::Tours, tour_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Tour {}", tour_id)))?;

        let slot = slot_key(tour_id, date);
        let holder = self.store.get(Collection::Bookings, &slot).await?.map(|_| slot);
        Ok(Availability {
            tour_id: tour_id.to_string(),
            date: date.to_string(),
            is_available: tour.active && holder.is_none() && !tour.is_occupied(date),
            booking_id: holder,
        })
    }

    /// Newest first.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, BookingError> {
        let mut bookings: Vec<Booking> = load_all(&*self.store, Collection::Bookings).await?;
        bookings.retain(|b| {
            filter.status.map_or(true, |s| b.status == s)
                && filter.tour_id.as_deref().map_or(true, |t| b.tour_id == t)
        });
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}
