use chrono::Utc;
use rocks_core::repository::{load, to_document, Collection, DocumentStore};
use rocks_core::tour::Tour;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::BookingError;

/// Upper bound on a per-person tour price.
pub const MAX_TOUR_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Fields an administrator may set on a tour. Occupancy is never writable
/// from here.
#[derive(Debug, Clone, Deserialize)]
pub struct TourUpsert {
    pub name: String,
    pub price: Decimal,
    pub max_participants: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TourUpsert {
    fn validate(&self) -> Result<(), BookingError> {
        if self.name.trim().is_empty() {
            return Err(BookingError::Validation("Tour name is required".to_string()));
        }
        if self.price <= Decimal::ZERO {
            return Err(BookingError::Validation("Tour price must be positive".to_string()));
        }
        if self.price > MAX_TOUR_PRICE {
            return Err(BookingError::Validation(format!("Tour price may not exceed {}", MAX_TOUR_PRICE)));
        }
        if self.max_participants == 0 {
            return Err(BookingError::Validation("max_participants must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Thin tour read/write slice used for seeding and the public tour pages.
pub struct TourCatalog {
    store: Arc<dyn DocumentStore>,
}

impl TourCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get_tour(&self, tour_id: &str) -> Result<Tour, BookingError> {
        load::<Tour>(&*self.store, Collection::Tours, tour_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Tour {}", tour_id)))
    }

    pub async fn occupied_dates(&self, tour_id: &str) -> Result<Vec<String>, BookingError> {
        Ok(self.get_tour(tour_id).await?.occupied_dates.into_iter().collect())
    }

    /// Creates the tour or merges the editable fields into it. Existing
    /// `occupied_dates` and unknown fields are left alone.
    pub async fn upsert_tour(&self, tour_id: &str, input: TourUpsert) -> Result<Tour, BookingError> {
        input.validate()?;

        let tour = Tour {
            active: input.active,
            ..Tour::new(tour_id, input.name.trim(), input.price, input.max_participants)
        };
        let doc = to_document(Collection::Tours, tour_id, &tour)?;
        if self.store.insert_if_absent(Collection::Tours, tour_id, doc).await? {
            info!(tour_id, "Tour created");
            return Ok(tour);
        }

        self.store
            .update(
                Collection::Tours,
                tour_id,
                json!({
                    "name": tour.name,
                    "price": tour.price,
                    "max_participants": tour.max_participants,
                    "active": tour.active,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        info!(tour_id, "Tour updated");
        self.get_tour(tour_id).await
    }
}
