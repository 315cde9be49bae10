//! Domain models for booking-service.

mod availability;
mod booking;
mod business;
mod coupon;
mod payment;
mod redemption;
mod referral;
mod retention;
mod seat_hold;
mod tour;
mod transaction;
mod user;

pub use availability::{AvailabilityOverride, UpsertAvailabilityOverride};
pub use booking::{
    Booking, BookingNotice, BookingScope, BookingStatus, DiscountSource, ListBookingsFilter, NewBooking,
    NoticeKind,
};
pub use business::{Business, CreateBusiness};
pub use coupon::{Coupon, CreateCoupon, DiscountType};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use redemption::{RedemptionAction, TicketRedemption};
pub use referral::{Referral, ReferralStats};
pub use retention::RetentionConfig;
pub use seat_hold::SeatHold;
pub use tour::{CreateTour, Tour, UpdateTour};
pub use transaction::{FinancialSummary, Transaction};
pub use user::{NewUser, Role, SanitizedUser, User};
