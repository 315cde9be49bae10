use crate::models::{Booking, BookingStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub tour_id: Uuid,

    #[serde(alias = "date")]
    pub booking_date: NaiveDate,

    #[validate(range(min = 0, max = 100))]
    pub adults: i32,

    #[validate(range(min = 0, max = 100))]
    #[serde(default)]
    pub children: i32,

    #[validate(length(min = 1, max = 200, message = "Customer name is required"))]
    pub customer_name: String,

    #[validate(email(message = "Invalid email format"))]
    pub customer_email: Option<String>,

    #[validate(length(max = 40))]
    pub customer_phone: Option<String>,

    #[validate(length(max = 64))]
    pub coupon_code: Option<String>,

    #[validate(length(max = 64))]
    pub referral_code: Option<String>,

    /// Hold placed earlier in checkout; its seats are handed to the booking.
    pub seat_hold_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBookingsQuery {
    pub status: Option<BookingStatus>,
    pub tour_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Session id is required"))]
    pub session_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRescheduleRequest {
    pub proposed_date: NaiveDate,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRescheduleRequest {
    #[serde(default)]
    pub accept_proposed: bool,
    pub new_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub success: bool,
    pub already_checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub booking: Booking,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_booking_accepts_date_alias() {
        let body = serde_json::json!({
            "tourId": Uuid::new_v4(),
            "date": "2026-07-01",
            "adults": 2,
            "customerName": "Ines",
            "couponCode": "SPRING20"
        });

        let req: CreateBookingRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.booking_date, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        assert_eq!(req.children, 0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_booking_rejects_blank_name() {
        let body = serde_json::json!({
            "tourId": Uuid::new_v4(),
            "bookingDate": "2026-07-01",
            "adults": 1,
            "customerName": ""
        });

        let req: CreateBookingRequest = serde_json::from_value(body).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_list_query_parses_status() {
        let q: ListBookingsQuery =
            serde_json::from_value(serde_json::json!({"status": "pending_payment"})).unwrap();
        assert_eq!(q.status, Some(BookingStatus::PendingPayment));
    }
}
