use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dates::BookingDate;

/// Field holding the derived occupancy set on a tour document.
pub const OCCUPIED_DATES_FIELD: &str = "occupied_dates";

/// A bookable tour.
///
/// `occupied_dates` is a cache derived from confirmed bookings; the booking
/// records are authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub price: Decimal,
    pub max_participants: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub occupied_dates: BTreeSet<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Tour {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal, max_participants: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            price,
            max_participants,
            active: true,
            occupied_dates: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_occupied(&self, date: &BookingDate) -> bool {
        self.occupied_dates.contains(&date.to_string())
    }

    /// Price for a party of `participants`, `None` when it does not fit a `Decimal`.
    pub fn total_for(&self, participants: u32) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(participants))
    }
}
