use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dates::BookingDate;
use crate::payment::PaymentMethod;
use crate::{CoreError, CoreResult};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Pending -> Confirmed, and any non-cancelled state -> Cancelled.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment side of a booking, tracked independently of the lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl BookingPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingPaymentStatus::Pending => "pending",
            BookingPaymentStatus::Paid => "paid",
            BookingPaymentStatus::Failed => "failed",
            BookingPaymentStatus::Refunded => "refunded",
        }
    }
}

/// Deterministic key of the booking document that owns a tour date.
pub fn slot_key(tour_id: &str, date: &BookingDate) -> String {
    format!("{}_{}", tour_id, date)
}

/// Customer request to reserve a tour date.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub tour_id: String,
    pub selected_date: String,
    pub customer_name: String,
    pub customer_email: String,
    pub participants: i64,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub special_requests: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl NewBooking {
    /// Checks everything that can be checked without the store.
    pub fn validate(&self) -> CoreResult<(BookingDate, u32)> {
        if self.tour_id.trim().is_empty() {
            return Err(CoreError::ValidationError("tour_id is required".to_string()));
        }
        if self.customer_name.trim().is_empty() {
            return Err(CoreError::ValidationError("customer_name is required".to_string()));
        }
        if !is_plausible_email(&self.customer_email) {
            return Err(CoreError::ValidationError(format!(
                "Invalid customer email: {}",
                self.customer_email
            )));
        }
        if self.participants <= 0 {
            return Err(CoreError::ValidationError(
                "participants must be greater than zero".to_string(),
            ));
        }
        let participants = u32::try_from(self.participants)
            .map_err(|_| CoreError::ValidationError("participants is too large".to_string()))?;

        let date = BookingDate::parse(&self.selected_date)?;
        Ok((date, participants))
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub tour_id: String,
    pub selected_date: BookingDate,
    pub participants: u32,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub special_requests: Option<String>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    #[serde(default)]
    pub payment_transaction_id: Option<String>,
    /// Gateway settlement reference (sale or charge id).
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub date_blocked: bool,
    #[serde(default)]
    pub date_blocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A fresh pending booking keyed by its slot.
    pub fn pending(request: &NewBooking, date: BookingDate, participants: u32, total_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: slot_key(&request.tour_id, &date),
            tour_id: request.tour_id.clone(),
            selected_date: date,
            participants,
            customer_name: request.customer_name.trim().to_string(),
            customer_email: request.customer_email.trim().to_string(),
            customer_phone: request.customer_phone.clone(),
            special_requests: request.special_requests.clone(),
            total_amount,
            payment_method: request.payment_method,
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Pending,
            payment_transaction_id: None,
            payment_reference: None,
            date_blocked: false,
            date_blocked_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot_key(&self) -> String {
        slot_key(&self.tour_id, &self.selected_date)
    }

    /// Live bookings hold their slot.
    pub fn is_live(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    /// Confirmed and already reflected in the tour's occupied dates.
    pub fn is_settled(&self) -> bool {
        self.status == BookingStatus::Confirmed && self.date_blocked
    }
}
