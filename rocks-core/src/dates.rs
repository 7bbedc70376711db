use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// Canonical day format used for slot keys, stored bookings and `occupied_dates`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// A tour date normalized to one calendar day.
///
/// Every boundary goes through [`BookingDate::parse`]: request bodies, slot keys,
/// occupied-date sets and the sync job. The calendar day is the one written in
/// the input's own offset (`2025-06-01T23:30:00-05:00` is June 1st), never a
/// UTC-converted day. The canonical instant of a date is noon UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingDate(NaiveDate);

impl BookingDate {
    pub fn parse(input: &str) -> CoreResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::ValidationError("Selected date is empty".to_string()));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(dt.date_naive()));
        }

        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self(dt.date()));
            }
        }

        NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .map(Self)
            .map_err(|_| {
                CoreError::ValidationError(format!(
                    "Invalid date format: {}. Use YYYY-MM-DD or an ISO 8601 timestamp.",
                    input
                ))
            })
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    /// Noon UTC of this day.
    pub fn canonical_instant(&self) -> DateTime<Utc> {
        (self.0.and_time(NaiveTime::default()) + Duration::hours(12)).and_utc()
    }
}

impl fmt::Display for BookingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for BookingDate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BookingDate {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BookingDate> for String {
    fn from(date: BookingDate) -> Self {
        date.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_equivalent_inputs_share_one_day() {
        let inputs = [
            "2025-06-01",
            " 2025-06-01 ",
            "2025-06-01T00:00:00Z",
            "2025-06-01T12:00:00.000Z",
            "2025-06-01T23:59:59Z",
            "2025-06-01T09:15",
            "2025-06-01T23:30:00-05:00",
            "2025-06-01T00:30:00+01:00",
            "2025-06-01 18:00:00",
        ];

        for input in inputs {
            let date = BookingDate::parse(input).unwrap();
            assert_eq!(date.to_string(), "2025-06-01", "input {input}");
        }
    }

    #[test]
    fn test_offset_day_is_not_converted_to_utc() {
        // 23:00 on May 31st in UTC is still May 31st as written.
        let date = BookingDate::parse("2025-05-31T23:00:00Z").unwrap();
        assert_eq!(date.to_string(), "2025-05-31");
    }

    #[test]
    fn test_invalid_dates_are_rejected() {
        for input in ["", "tomorrow", "2025-13-01", "2025-02-30", "01/06/2025"] {
            assert!(BookingDate::parse(input).is_err(), "input {input:?}");
        }
    }

    #[test]
    fn test_canonical_instant_is_noon_utc() {
        let instant = BookingDate::parse("2025-10-26").unwrap().canonical_instant();
        assert_eq!(instant.hour(), 12);
        assert_eq!(instant.date_naive().to_string(), "2025-10-26");
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let date: BookingDate = serde_json::from_str("\"2025-06-01T10:00:00Z\"").unwrap();
        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2025-06-01\"");
    }
}
