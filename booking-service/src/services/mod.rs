//! Services layer for booking-service.
//!
//! Persistence, the booking lifecycle, payment gateway and email clients,
//! plus the pure money and code helpers they share.

pub mod clock;
pub mod codes;
mod database;
pub mod discount;
mod email;
pub mod error;
pub mod gateway;
mod jwt;
pub mod lifecycle;
pub mod metrics;
pub mod settlement;

pub use clock::{Clock, FixedClock, SystemClock};
pub use database::{Database, PaymentRecord, SettlementRecord};
pub use email::{EmailProvider, MockEmailService, NoopEmailService, SentEmail, SmtpEmailService};
pub use error::ServiceError;
pub use gateway::{MockPaymentGateway, PaymentGateway, StripeGateway};
pub use jwt::{AccessTokenClaims, JwtService};
pub use lifecycle::{BookingService, LifecycleSettings};
pub use metrics::{get_metrics, init_metrics};
