use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyEventKind {
    /// A pending booking took the slot.
    Reserved,
    /// Payment reconciled; the date is in the tour's occupied set.
    Occupied,
    /// The slot was released by an administrator.
    Released,
}

impl OccupancyEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyEventKind::Reserved => "reserved",
            OccupancyEventKind::Occupied => "occupied",
            OccupancyEventKind::Released => "released",
        }
    }
}

/// Broadcast to occupancy subscribers whenever a tour date changes hands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyEvent {
    pub tour_id: String,
    pub date: String,
    pub booking_id: String,
    pub kind: OccupancyEventKind,
    pub at: DateTime<Utc>,
}

impl OccupancyEvent {
    pub fn new(
        kind: OccupancyEventKind,
        tour_id: impl Into<String>,
        date: impl Into<String>,
        booking_id: impl Into<String>,
    ) -> Self {
        Self {
            tour_id: tour_id.into(),
            date: date.into(),
            booking_id: booking_id.into(),
            kind,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_kind_in_snake_case() {
        let event = OccupancyEvent::new(OccupancyEventKind::Occupied, "tour-fatima", "2025-06-01", "b1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "occupied");
        assert_eq!(json["date"], "2025-06-01");
    }
}
