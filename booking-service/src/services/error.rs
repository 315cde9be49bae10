use chrono::NaiveDate;
use service_core::error::AppError;
use thiserror::Error;

/// Booking lifecycle outcomes that are not plain storage failures.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Booking not found")]
    BookingNotFound,

    #[error("Tour not found")]
    TourNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Ticket not found")]
    TicketNotFound,

    #[error("Coupon not found or no longer valid")]
    CouponUnavailable,

    #[error("Reschedule link is invalid or has already been used")]
    InvalidRescheduleToken,

    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Booking is {0}")]
    BookingVoid(String),

    #[error("Tour is not available on {0}")]
    DateBlocked(NaiveDate),

    #[error("Only {remaining} seats left, {requested} requested")]
    CapacityExceeded { requested: i64, remaining: i64 },

    #[error("Ticket already redeemed")]
    AlreadyRedeemed,

    #[error("Payment not completed (gateway status: {0})")]
    PaymentNotCompleted(String),

    #[error("Booking is already paid")]
    AlreadyPaid,

    #[error("Payment session does not belong to this booking")]
    SessionMismatch,

    #[error("Payment gateway error: {0}")]
    GatewayFailure(String),

    #[error("Refund rejected by gateway (status: {0})")]
    RefundRejected(String),

    #[error("Payment is not refundable: {0}")]
    NotRefundable(String),

    #[error("Could not allocate a unique ticket code")]
    CodeAllocationExhausted,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::BookingNotFound
            | ServiceError::TourNotFound
            | ServiceError::PaymentNotFound
            | ServiceError::TicketNotFound
            | ServiceError::CouponUnavailable
            | ServiceError::InvalidRescheduleToken => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::InvalidTransition { .. }
            | ServiceError::BookingVoid(_)
            | ServiceError::DateBlocked(_)
            | ServiceError::PaymentNotCompleted(_)
            | ServiceError::SessionMismatch
            | ServiceError::NotRefundable(_)
            | ServiceError::Validation(_) => AppError::BadRequest(anyhow::anyhow!(message)),
            ServiceError::CapacityExceeded { .. }
            | ServiceError::AlreadyRedeemed
            | ServiceError::AlreadyPaid => AppError::Conflict(anyhow::anyhow!(message)),
            ServiceError::GatewayFailure(_) | ServiceError::RefundRejected(_) => {
                AppError::BadGateway(message)
            }
            ServiceError::CodeAllocationExhausted => AppError::InternalError(anyhow::anyhow!(message)),
            ServiceError::Forbidden(_) => AppError::Forbidden(anyhow::anyhow!(message)),
        }
    }
}
