//! Booking model and status machine.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Booking status.
///
/// `pending` is the initial state. Checkout moves it to `pending_payment`,
/// payment (card or cash) to `confirmed`, check-in or redemption to
/// `completed`. `pending_reschedule` is a side branch entered when an
/// operator proposes a new date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    PendingPayment,
    PendingReschedule,
    Confirmed,
    Completed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::PendingReschedule => "pending_reschedule",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending_payment" => BookingStatus::PendingPayment,
            "pending_reschedule" => BookingStatus::PendingReschedule,
            "confirmed" => BookingStatus::Confirmed,
            "completed" => BookingStatus::Completed,
            "cancelled" => BookingStatus::Cancelled,
            "refunded" => BookingStatus::Refunded,
            _ => BookingStatus::Pending,
        }
    }

    /// Cancelled and refunded bookings no longer hold seats or admit guests.
    pub fn is_void(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Refunded)
    }

    /// Not yet paid.
    pub fn awaits_payment(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::PendingPayment)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (Pending, PendingPayment | Confirmed | PendingReschedule | Cancelled) => true,
            (PendingPayment, PendingPayment | Confirmed | PendingReschedule | Cancelled) => true,
            (Confirmed, Completed | PendingReschedule | Cancelled | Refunded) => true,
            (PendingReschedule, Pending | Confirmed | Cancelled) => true,
            (Completed, Cancelled | Refunded) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the final amount was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    Coupon,
    Referral,
    None,
}

impl DiscountSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountSource::Coupon => "coupon",
            DiscountSource::Referral => "referral",
            DiscountSource::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub booking_date: NaiveDate,
    pub adults: i32,
    pub children: i32,
    pub gross_amount: Decimal,
    pub total_amount: Decimal,
    pub discount_source: String,
    pub coupon_code: Option<String>,
    pub status: String,
    pub qr_code: String,
    pub alphanumeric_code: String,
    pub reserved_until: Option<DateTime<Utc>>,
    pub checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<Uuid>,
    pub proposed_date: Option<NaiveDate>,
    pub reschedule_reason: Option<String>,
    #[serde(skip_serializing)]
    pub reschedule_token: Option<String>,
    #[serde(skip_serializing)]
    pub status_before_reschedule: Option<String>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub review_requested_at: Option<DateTime<Utc>>,
    pub recovery_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn status(&self) -> BookingStatus {
        BookingStatus::from_string(&self.status)
    }

    pub fn party_size(&self) -> i32 {
        self.adults + self.children
    }
}

/// Row values for a booking insert. Codes are generated per attempt.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub tour_id: Uuid,
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub booking_date: NaiveDate,
    pub adults: i32,
    pub children: i32,
    pub gross_amount: Decimal,
    pub total_amount: Decimal,
    pub discount_source: DiscountSource,
    pub coupon_code: Option<String>,
    pub status: BookingStatus,
    pub reserved_until: DateTime<Utc>,
}

/// Booking joined with the tour fields customer emails need.
#[derive(Debug, Clone, FromRow)]
pub struct BookingNotice {
    pub booking_id: Uuid,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub booking_date: NaiveDate,
    pub adults: i32,
    pub children: i32,
    pub total_amount: Decimal,
    pub qr_code: String,
    pub alphanumeric_code: String,
    pub tour_name: String,
    pub tour_location: String,
    pub departure_time: Option<NaiveTime>,
}

/// Customer emails sent by the scheduled sweeps. Each has its own
/// de-duplication timestamp on the booking row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Reminder,
    ReviewRequest,
    CartRecovery,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Reminder => "reminder",
            NoticeKind::ReviewRequest => "review_request",
            NoticeKind::CartRecovery => "cart_recovery",
        }
    }

    pub(crate) fn stamp_column(&self) -> &'static str {
        match self {
            NoticeKind::Reminder => "reminder_sent_at",
            NoticeKind::ReviewRequest => "review_requested_at",
            NoticeKind::CartRecovery => "recovery_sent_at",
        }
    }
}

/// Which bookings a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingScope {
    All,
    Business(Uuid),
    Seller(Uuid),
    Customer(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct ListBookingsFilter {
    pub status: Option<BookingStatus>,
    pub tour_id: Option<Uuid>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: i64,
    pub offset: i64,
}
