//! Booking lifecycle service.
//!
//! Owns every state change a booking goes through: creation with discount
//! resolution, checkout and payment verification, cash confirmation,
//! refunds, reschedule proposals, check-in and redemption. Persistence
//! happens through [`Database`]; the payment gateway, email provider and
//! clock are injected.

use crate::config::BookingConfig;
use crate::dtos::bookings::{CreateBookingRequest, ResolveRescheduleRequest};
use crate::middleware::authz::ensure_tour_access;
use crate::models::{
    AvailabilityOverride, Booking, BookingStatus, Coupon, DiscountSource, NewBooking, Payment,
    PaymentMethod, PaymentStatus, RetentionConfig, SeatHold, Tour, Transaction,
    UpsertAvailabilityOverride,
};
use crate::services::clock::{local_date, Clock};
use crate::services::codes;
use crate::services::database::{Database, PaymentRecord};
use crate::services::discount::{apply_coupon, resolve_discount, DiscountLookup, DiscountOutcome};
use crate::services::email::EmailProvider;
use crate::services::error::ServiceError;
use crate::services::gateway::{from_minor_units, CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::services::jwt::AccessTokenClaims;
use crate::services::metrics::{
    BOOKINGS_CREATED_TOTAL, NOTIFICATIONS_TOTAL, PAYMENTS_RECORDED_TOTAL, REFUNDS_TOTAL,
};
use crate::services::settlement::{compute_settlement, RetentionRates};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Referral code allocation attempts before giving up.
const REFERRAL_CODE_ATTEMPTS: u32 = 3;

/// Settings the lifecycle reads from configuration.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub currency: String,
    pub public_base_url: String,
    pub seat_hold_minutes: i64,
    pub confirm_on_create: bool,
    pub utc_offset_minutes: i32,
}

impl LifecycleSettings {
    pub fn from_config(config: &BookingConfig) -> Self {
        Self {
            currency: config.payment.currency.clone(),
            public_base_url: config.public_base_url.clone(),
            seat_hold_minutes: config.booking.seat_hold_minutes,
            confirm_on_create: config.booking.confirm_on_create,
            utc_offset_minutes: config.scheduler.utc_offset_minutes,
        }
    }
}

/// Seats on one tour date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub tour_id: Uuid,
    pub date: NaiveDate,
    pub capacity: i64,
    pub booked: i64,
    pub held: i64,
    pub remaining: i64,
    pub blocked: bool,
    pub reason: Option<String>,
}

/// Outcome of a card verification or cash confirmation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    pub booking: Booking,
    pub payment: Payment,
    /// `None` when the payment had already been recorded.
    pub transaction: Option<Transaction>,
    pub already_recorded: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    pub payment: Payment,
    pub booking: Booking,
    pub refund_id: String,
    pub gateway_status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleProposal {
    pub booking: Booking,
    pub resolution_link: String,
}

/// What the customer sees on the public reschedule page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleDetails {
    pub booking_id: Uuid,
    pub customer_name: String,
    pub tour_name: String,
    pub current_date: NaiveDate,
    pub proposed_date: Option<NaiveDate>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckInResult {
    pub booking: Booking,
    pub already_checked_in: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketValidation {
    pub valid: bool,
    pub reason: Option<String>,
    pub booking: Option<Booking>,
}

/// Public view behind `GET /bookings/qr/:code`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetails {
    pub booking: Booking,
    pub tour_name: String,
    pub tour_location: String,
    pub valid: bool,
    pub reason: Option<String>,
}

/// How a scanned or typed ticket is looked up.
#[derive(Debug, Clone, Copy)]
pub enum TicketRef<'a> {
    Qr(&'a str),
    Code(&'a str),
}

#[derive(Debug, Clone)]
pub struct OverrideOutcome {
    pub availability_override: AvailabilityOverride,
    pub displaced_bookings: Vec<Booking>,
}

/// Seat capacity for a date: an override's custom capacity wins over the
/// tour's. Blocked dates have no capacity.
pub fn effective_capacity(
    tour: &Tour,
    date_override: Option<&AvailabilityOverride>,
) -> (i64, bool, Option<String>) {
    match date_override {
        Some(o) if o.is_blocked => (0, true, o.reason.clone()),
        Some(o) => (
            o.custom_capacity.unwrap_or(tour.capacity) as i64,
            false,
            o.reason.clone(),
        ),
        None => (tour.capacity as i64, false, None),
    }
}

/// Whether a booking's ticket admits its holder right now.
pub fn ticket_verdict(booking: &Booking) -> Result<(), String> {
    let status = booking.status();
    if status.is_void() {
        return Err(format!("Booking is {}", status));
    }
    if booking.redeemed_at.is_some() {
        return Err("Ticket already redeemed".to_string());
    }
    if status.awaits_payment() {
        return Err("Booking is not paid".to_string());
    }
    if status == BookingStatus::PendingReschedule {
        return Err("Booking is awaiting a new date".to_string());
    }
    Ok(())
}

/// Check-in and redemption need a paid booking on its current date.
pub fn ensure_attendable(status: BookingStatus) -> Result<(), ServiceError> {
    if status.is_void() {
        return Err(ServiceError::BookingVoid(status.to_string()));
    }
    if !matches!(status, BookingStatus::Confirmed | BookingStatus::Completed) {
        return Err(ServiceError::InvalidTransition {
            from: status.to_string(),
            to: BookingStatus::Completed.to_string(),
        });
    }
    Ok(())
}

pub fn checkout_return_urls(base_url: &str, booking_id: Uuid) -> (String, String) {
    (
        format!(
            "{}/bookings/{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
            base_url, booking_id
        ),
        format!("{}/bookings/{}/resume", base_url, booking_id),
    )
}

pub fn reschedule_link(base_url: &str, token: &str) -> String {
    format!("{}/bookings/resolve/{}", base_url, token)
}

fn ensure_not_past(date: NaiveDate, today: NaiveDate) -> Result<(), ServiceError> {
    if date < today {
        return Err(ServiceError::Validation(format!(
            "Date {} is in the past",
            date
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct BookingService {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
    email: Arc<dyn EmailProvider>,
    clock: Arc<dyn Clock>,
    settings: LifecycleSettings,
}

impl BookingService {
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        email: Arc<dyn EmailProvider>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            db,
            gateway,
            email,
            clock,
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.settings.utc_offset_minutes)
    }

    async fn load_booking(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        self.db
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::BookingNotFound.into())
    }

    async fn load_tour(&self, tour_id: Uuid) -> Result<Tour, AppError> {
        self.db
            .get_tour(tour_id)
            .await?
            .ok_or_else(|| ServiceError::TourNotFound.into())
    }

    // -------------------------------------------------------------------------
    // Availability and seat holds
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn availability(&self, tour_id: Uuid, date: NaiveDate) -> Result<Availability, AppError> {
        let tour = self.load_tour(tour_id).await?;
        let date_override = self.db.get_availability_override(tour_id, date).await?;
        let (capacity, blocked, reason) = effective_capacity(&tour, date_override.as_ref());

        let now = self.now();
        let taken = self.db.seats_taken(tour_id, date, now, None).await?;
        let held = self.db.held_seats(tour_id, date, now).await?;

        Ok(Availability {
            tour_id,
            date,
            capacity,
            booked: taken - held,
            held,
            remaining: if blocked { 0 } else { (capacity - taken).max(0) },
            blocked,
            reason,
        })
    }

    /// Bookable capacity for a date, or `DateBlocked`.
    async fn open_capacity(&self, tour: &Tour, date: NaiveDate) -> Result<i64, AppError> {
        let date_override = self.db.get_availability_override(tour.id, date).await?;
        let (capacity, blocked, _) = effective_capacity(tour, date_override.as_ref());
        if blocked {
            return Err(ServiceError::DateBlocked(date).into());
        }
        Ok(capacity)
    }

    #[instrument(skip(self))]
    pub async fn place_seat_hold(
        &self,
        tour_id: Uuid,
        date: NaiveDate,
        seats: i32,
    ) -> Result<SeatHold, AppError> {
        if seats < 1 {
            return Err(ServiceError::Validation("Seats must be positive".to_string()).into());
        }
        ensure_not_past(date, self.today())?;

        let tour = self.load_tour(tour_id).await?;
        if !tour.is_active {
            return Err(ServiceError::Validation("Tour is not bookable".to_string()).into());
        }
        let capacity = self.open_capacity(&tour, date).await?;

        let now = self.now();
        let expires_at = now + Duration::minutes(self.settings.seat_hold_minutes);
        self.db
            .create_seat_hold(tour_id, date, seats, capacity, now, expires_at)
            .await
    }

    // -------------------------------------------------------------------------
    // Booking creation
    // -------------------------------------------------------------------------

    /// Create a booking. A coupon code is tried before a referral code and
    /// the first that applies wins. Codes that match nothing are ignored.
    #[instrument(skip(self, req, requester), fields(tour_id = %req.tour_id, date = %req.booking_date))]
    pub async fn create_booking(
        &self,
        req: &CreateBookingRequest,
        requester: Option<&AccessTokenClaims>,
    ) -> Result<Booking, AppError> {
        if req.adults < 0 || req.children < 0 || req.adults + req.children < 1 {
            return Err(
                ServiceError::Validation("A booking needs at least one guest".to_string()).into(),
            );
        }

        let now = self.now();
        ensure_not_past(req.booking_date, self.today())?;

        let tour = self.load_tour(req.tour_id).await?;
        if !tour.is_active {
            return Err(ServiceError::Validation("Tour is not bookable".to_string()).into());
        }
        let capacity = self.open_capacity(&tour, req.booking_date).await?;

        if let Some(hold_id) = req.seat_hold_id {
            let usable = self.db.get_seat_hold(hold_id).await?.is_some_and(|hold| {
                hold.tour_id == tour.id && hold.hold_date == req.booking_date && hold.expires_at > now
            });
            if !usable {
                return Err(
                    ServiceError::Validation("Seat hold is invalid or expired".to_string()).into(),
                );
            }
        }

        let gross_amount = tour.gross_for(req.adults, req.children);
        let requester_id = requester.map(|c| c.sub);

        let mut discount = DiscountOutcome::none(gross_amount);
        for code in [req.coupon_code.as_deref(), req.referral_code.as_deref()]
            .into_iter()
            .flatten()
        {
            discount = resolve_discount(
                &self.db,
                Some(code),
                gross_amount,
                requester_id,
                tour.business_id,
                now,
            )
            .await?;
            if discount.applied_via != DiscountSource::None {
                break;
            }
        }

        let status = if self.settings.confirm_on_create {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Pending
        };

        let new_booking = NewBooking {
            tour_id: tour.id,
            user_id: requester_id,
            customer_name: req.customer_name.trim().to_string(),
            customer_email: req.customer_email.clone(),
            customer_phone: req.customer_phone.clone(),
            booking_date: req.booking_date,
            adults: req.adults,
            children: req.children,
            gross_amount,
            total_amount: discount.final_amount,
            discount_source: discount.applied_via,
            coupon_code: discount.coupon.as_ref().map(|c| c.code.clone()),
            status,
            reserved_until: now + Duration::minutes(self.settings.seat_hold_minutes),
        };

        let created = self
            .db
            .create_booking(
                &new_booking,
                capacity,
                req.seat_hold_id,
                discount.referral.as_ref(),
                now,
            )
            .await;

        let booking = match created {
            Ok(booking) => booking,
            Err(e) => {
                if let Some(coupon) = &discount.coupon {
                    if let Err(release_err) = self.db.release_coupon(coupon.id).await {
                        error!(error = %release_err, coupon_id = %coupon.id, "Failed to release coupon use");
                    }
                }
                return Err(e);
            }
        };

        BOOKINGS_CREATED_TOTAL
            .with_label_values(&[discount.applied_via.as_str()])
            .inc();

        self.send_confirmation(booking.id).await;

        Ok(booking)
    }

    /// Best-effort booking confirmation email.
    async fn send_confirmation(&self, booking_id: Uuid) {
        let notice = match self.db.get_booking_notice(booking_id).await {
            Ok(Some(notice)) if notice.customer_email.is_some() => notice,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, booking_id = %booking_id, "Could not load booking for confirmation email");
                return;
            }
        };

        let outcome = match self.email.send_booking_confirmation(&notice).await {
            Ok(()) => "sent",
            Err(e) => {
                warn!(error = %e, booking_id = %booking_id, "Booking confirmation email failed");
                "failed"
            }
        };
        NOTIFICATIONS_TOTAL
            .with_label_values(&["confirmation", outcome])
            .inc();
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        self.load_booking(booking_id).await
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    async fn has_settled_payment(&self, booking_id: Uuid) -> Result<bool, AppError> {
        let payments = self
            .db
            .list_payments(Some(PaymentStatus::Succeeded), Some(booking_id), 1, 0)
            .await?;
        Ok(!payments.is_empty())
    }

    /// Unpaid bookings, plus bookings confirmed on creation that have no
    /// payment yet.
    async fn ensure_payable(&self, booking: &Booking) -> Result<(), AppError> {
        let status = booking.status();
        if status.is_void() {
            return Err(ServiceError::BookingVoid(status.to_string()).into());
        }
        if status.awaits_payment() {
            return Ok(());
        }
        if status == BookingStatus::Confirmed
            && self.settings.confirm_on_create
            && !self.has_settled_payment(booking.id).await?
        {
            return Ok(());
        }
        Err(ServiceError::InvalidTransition {
            from: status.to_string(),
            to: BookingStatus::Confirmed.to_string(),
        }
        .into())
    }

    #[instrument(skip(self))]
    pub async fn start_checkout(&self, booking_id: Uuid) -> Result<CheckoutSession, AppError> {
        let booking = self.load_booking(booking_id).await?;
        self.ensure_payable(&booking).await?;
        let tour = self.load_tour(booking.tour_id).await?;

        let (success_url, cancel_url) =
            checkout_return_urls(&self.settings.public_base_url, booking.id);
        let request = CheckoutRequest {
            booking_id: booking.id,
            amount: booking.total_amount,
            currency: self.settings.currency.clone(),
            description: format!("{} on {}", tour.name, booking.booking_date),
            customer_email: booking.customer_email.clone(),
            success_url,
            cancel_url,
        };

        let session = self.gateway.create_checkout_session(&request).await.map_err(|e| {
            error!(error = %e, booking_id = %booking.id, "Checkout session creation failed");
            ServiceError::GatewayFailure(e.to_string())
        })?;

        if booking.status() == BookingStatus::Pending {
            self.db
                .transition_booking(
                    booking.id,
                    &[BookingStatus::Pending],
                    BookingStatus::PendingPayment,
                )
                .await?;
        }

        info!(booking_id = %booking.id, session_id = %session.session_id, "Checkout session created");
        Ok(session)
    }

    /// Settle a card payment once the gateway reports the session paid.
    /// Verifying the same paid session again returns the recorded payment.
    #[instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<PaymentResult, AppError> {
        let booking = self.load_booking(booking_id).await?;

        let session = self.gateway.verify_payment(session_id).await.map_err(|e| {
            error!(error = %e, booking_id = %booking.id, "Payment verification failed");
            ServiceError::GatewayFailure(e.to_string())
        })?;

        if let Some(session_booking) = session.booking_id.as_deref() {
            if session_booking != booking.id.to_string() {
                warn!(booking_id = %booking.id, session_booking = %session_booking, "Session belongs to another booking");
                return Err(ServiceError::SessionMismatch.into());
            }
        }

        if !session.is_paid() {
            if booking.status() == BookingStatus::Pending {
                self.db
                    .transition_booking(
                        booking.id,
                        &[BookingStatus::Pending],
                        BookingStatus::PendingPayment,
                    )
                    .await?;
            }
            info!(booking_id = %booking.id, payment_status = %session.payment_status, "Payment not completed");
            return Err(ServiceError::PaymentNotCompleted(session.payment_status).into());
        }

        let intent = session
            .payment_intent_id
            .clone()
            .unwrap_or_else(|| session.session_id.clone());
        let amount = session
            .amount_total
            .map(from_minor_units)
            .unwrap_or(booking.total_amount);
        let currency = session
            .currency
            .clone()
            .unwrap_or_else(|| self.settings.currency.clone());

        if self.db.get_payment_by_intent(&intent).await?.is_none()
            && self.has_settled_payment(booking.id).await?
        {
            warn!(
                booking_id = %booking.id,
                payment_intent_id = %intent,
                "Card payment for a booking that is already paid, refund it manually"
            );
            return Err(ServiceError::AlreadyPaid.into());
        }

        self.settle(&booking, intent, amount, currency, PaymentMethod::Card)
            .await
    }

    /// Record a cash payment taken by a seller.
    #[instrument(skip(self, actor), fields(actor = %actor.sub))]
    pub async fn confirm_cash_payment(
        &self,
        actor: &AccessTokenClaims,
        booking_id: Uuid,
    ) -> Result<PaymentResult, AppError> {
        let booking = self.load_booking(booking_id).await?;
        let tour = self.load_tour(booking.tour_id).await?;
        ensure_tour_access(actor, &tour)?;
        self.ensure_payable(&booking).await?;

        let intent = format!("cash_{}", Uuid::new_v4().simple());
        let amount = booking.total_amount;
        let currency = self.settings.currency.clone();

        self.settle(&booking, intent, amount, currency, PaymentMethod::Cash)
            .await
    }

    async fn settle(
        &self,
        booking: &Booking,
        payment_intent_id: String,
        amount: Decimal,
        currency: String,
        method: PaymentMethod,
    ) -> Result<PaymentResult, AppError> {
        let rates = self.retention_rates().await?;
        let settlement = compute_settlement(amount, &rates, method);
        let record = PaymentRecord {
            booking_id: booking.id,
            tour_id: booking.tour_id,
            payment_intent_id,
            amount,
            currency,
            method,
        };

        match self.db.record_settlement(&record, &settlement).await? {
            Some(recorded) => {
                PAYMENTS_RECORDED_TOTAL
                    .with_label_values(&[method.as_str()])
                    .inc();
                Ok(PaymentResult {
                    success: true,
                    booking: recorded.booking,
                    payment: recorded.payment,
                    transaction: Some(recorded.transaction),
                    already_recorded: false,
                })
            }
            None => {
                let payment = self
                    .db
                    .get_payment_by_intent(&record.payment_intent_id)
                    .await?
                    .ok_or(ServiceError::PaymentNotFound)?;
                let booking = self.load_booking(booking.id).await?;
                Ok(PaymentResult {
                    success: true,
                    booking,
                    payment,
                    transaction: None,
                    already_recorded: true,
                })
            }
        }
    }

    /// Full refund through the gateway. Payment and booking only change when
    /// the gateway accepts the refund.
    #[instrument(skip(self))]
    pub async fn refund_payment(&self, payment_id: Uuid) -> Result<RefundResult, AppError> {
        let payment = self
            .db
            .get_payment(payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound)?;

        if payment.method() == PaymentMethod::Cash {
            return Err(ServiceError::NotRefundable(
                "cash payments are settled outside the gateway".to_string(),
            )
            .into());
        }
        if payment.status() != PaymentStatus::Succeeded {
            return Err(ServiceError::NotRefundable(format!("payment is {}", payment.status)).into());
        }

        let outcome = match self.gateway.process_refund(&payment.payment_intent_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                REFUNDS_TOTAL.with_label_values(&["error"]).inc();
                error!(error = %e, payment_id = %payment.id, "Gateway refund failed");
                return Err(ServiceError::GatewayFailure(e.to_string()).into());
            }
        };

        if !outcome.accepted() {
            REFUNDS_TOTAL.with_label_values(&["rejected"]).inc();
            warn!(payment_id = %payment.id, status = %outcome.status, "Gateway rejected refund");
            return Err(ServiceError::RefundRejected(outcome.status).into());
        }

        let (payment, booking) = self
            .db
            .apply_refund(payment.id)
            .await?
            .ok_or_else(|| ServiceError::NotRefundable("payment was already refunded".to_string()))?;

        REFUNDS_TOTAL.with_label_values(&["refunded"]).inc();
        info!(
            payment_id = %payment.id,
            booking_id = %booking.id,
            refund_id = %outcome.refund_id,
            "Payment refunded"
        );

        Ok(RefundResult {
            payment,
            booking,
            refund_id: outcome.refund_id,
            gateway_status: outcome.status,
        })
    }

    // -------------------------------------------------------------------------
    // Reschedule
    // -------------------------------------------------------------------------

    #[instrument(skip(self, actor, reason), fields(actor = %actor.sub))]
    pub async fn propose_reschedule(
        &self,
        actor: &AccessTokenClaims,
        booking_id: Uuid,
        proposed_date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<RescheduleProposal, AppError> {
        let booking = self.load_booking(booking_id).await?;
        let tour = self.load_tour(booking.tour_id).await?;
        ensure_tour_access(actor, &tour)?;
        ensure_not_past(proposed_date, self.today())?;

        let status = booking.status();
        if status.is_void() {
            return Err(ServiceError::BookingVoid(status.to_string()).into());
        }
        if !status.can_transition_to(BookingStatus::PendingReschedule) {
            return Err(ServiceError::InvalidTransition {
                from: status.to_string(),
                to: BookingStatus::PendingReschedule.to_string(),
            }
            .into());
        }

        let token = codes::generate_reschedule_token();
        let updated = self
            .db
            .propose_reschedule(
                booking.id,
                &[
                    BookingStatus::Pending,
                    BookingStatus::PendingPayment,
                    BookingStatus::Confirmed,
                ],
                proposed_date,
                reason,
                &token,
            )
            .await?
            .ok_or_else(|| ServiceError::InvalidTransition {
                from: status.to_string(),
                to: BookingStatus::PendingReschedule.to_string(),
            })?;

        info!(booking_id = %updated.id, proposed_date = %proposed_date, "Reschedule proposed");

        Ok(RescheduleProposal {
            booking: updated,
            resolution_link: reschedule_link(&self.settings.public_base_url, &token),
        })
    }

    async fn booking_for_token(&self, token: &str) -> Result<Booking, AppError> {
        self.db
            .get_booking_by_reschedule_token(token)
            .await?
            .ok_or_else(|| ServiceError::InvalidRescheduleToken.into())
    }

    pub async fn reschedule_details(&self, token: &str) -> Result<RescheduleDetails, AppError> {
        let booking = self.booking_for_token(token).await?;
        let tour = self.load_tour(booking.tour_id).await?;

        Ok(RescheduleDetails {
            booking_id: booking.id,
            customer_name: booking.customer_name,
            tour_name: tour.name,
            current_date: booking.booking_date,
            proposed_date: booking.proposed_date,
            reason: booking.reschedule_reason,
        })
    }

    /// Customer accepts the proposed date or picks another one. The token
    /// is single-use.
    #[instrument(skip(self, token, req))]
    pub async fn resolve_reschedule(
        &self,
        token: &str,
        req: &ResolveRescheduleRequest,
    ) -> Result<Booking, AppError> {
        let booking = self.booking_for_token(token).await?;

        let new_date = if req.accept_proposed {
            booking.proposed_date.ok_or_else(|| {
                ServiceError::Validation("No proposed date to accept".to_string())
            })?
        } else {
            req.new_date.ok_or_else(|| {
                ServiceError::Validation("newDate is required unless acceptProposed is set".to_string())
            })?
        };
        ensure_not_past(new_date, self.today())?;

        let tour = self.load_tour(booking.tour_id).await?;
        let capacity = self.open_capacity(&tour, new_date).await?;

        self.db
            .resolve_reschedule(token, new_date, capacity, self.now())
            .await?
            .ok_or_else(|| ServiceError::InvalidRescheduleToken.into())
    }

    // -------------------------------------------------------------------------
    // Check-in and tickets
    // -------------------------------------------------------------------------

    /// Idempotent: a second check-in reports the original timestamp.
    #[instrument(skip(self, actor), fields(actor = %actor.sub))]
    pub async fn check_in(
        &self,
        actor: &AccessTokenClaims,
        booking_id: Uuid,
    ) -> Result<CheckInResult, AppError> {
        let booking = self.load_booking(booking_id).await?;
        let tour = self.load_tour(booking.tour_id).await?;
        ensure_tour_access(actor, &tour)?;

        let status = booking.status();
        if status.is_void() {
            return Err(ServiceError::BookingVoid(status.to_string()).into());
        }
        if booking.checked_in {
            return Ok(CheckInResult {
                booking,
                already_checked_in: true,
            });
        }
        ensure_attendable(status)?;

        match self.db.mark_checked_in(booking.id, actor.sub, self.now()).await? {
            Some(updated) => {
                info!(booking_id = %updated.id, "Booking checked in");
                Ok(CheckInResult {
                    booking: updated,
                    already_checked_in: false,
                })
            }
            None => {
                // Lost a race with another check-in or a cancellation
                let current = self.load_booking(booking.id).await?;
                if current.checked_in {
                    Ok(CheckInResult {
                        booking: current,
                        already_checked_in: true,
                    })
                } else {
                    ensure_attendable(current.status())?;
                    Err(ServiceError::BookingVoid(current.status).into())
                }
            }
        }
    }

    async fn find_ticket(&self, ticket: TicketRef<'_>) -> Result<Option<Booking>, AppError> {
        match ticket {
            TicketRef::Qr(qr) => self.db.get_booking_by_qr_code(qr).await,
            TicketRef::Code(code) => self.db.get_booking_by_alphanumeric_code(code).await,
        }
    }

    /// Staff-side ticket check. Unknown tickets are reported as invalid.
    #[instrument(skip(self, actor, ticket), fields(actor = %actor.sub))]
    pub async fn validate_ticket(
        &self,
        actor: &AccessTokenClaims,
        ticket: TicketRef<'_>,
    ) -> Result<TicketValidation, AppError> {
        let Some(booking) = self.find_ticket(ticket).await? else {
            return Ok(TicketValidation {
                valid: false,
                reason: Some("Ticket not found".to_string()),
                booking: None,
            });
        };

        let tour = self.load_tour(booking.tour_id).await?;
        ensure_tour_access(actor, &tour)?;

        let verdict = ticket_verdict(&booking);
        Ok(TicketValidation {
            valid: verdict.is_ok(),
            reason: verdict.err(),
            booking: Some(booking),
        })
    }

    /// Public lookup behind the QR image.
    pub async fn lookup_ticket(&self, qr_code: &str) -> Result<TicketDetails, AppError> {
        let booking = self
            .db
            .get_booking_by_qr_code(qr_code)
            .await?
            .ok_or(ServiceError::TicketNotFound)?;
        let tour = self.load_tour(booking.tour_id).await?;
        let verdict = ticket_verdict(&booking);

        Ok(TicketDetails {
            booking,
            tour_name: tour.name,
            tour_location: tour.location,
            valid: verdict.is_ok(),
            reason: verdict.err(),
        })
    }

    /// Single-use redemption by QR token or backup code.
    #[instrument(skip(self, actor, code), fields(actor = %actor.sub))]
    pub async fn redeem_ticket(
        &self,
        actor: &AccessTokenClaims,
        code: &str,
    ) -> Result<Booking, AppError> {
        let booking = self
            .db
            .get_booking_by_ticket_code(code)
            .await?
            .ok_or(ServiceError::TicketNotFound)?;
        let tour = self.load_tour(booking.tour_id).await?;
        ensure_tour_access(actor, &tour)?;

        if booking.redeemed_at.is_some() {
            return Err(ServiceError::AlreadyRedeemed.into());
        }
        ensure_attendable(booking.status())?;

        let redeemed = self
            .db
            .mark_redeemed(booking.id, actor.sub, self.now())
            .await?
            .ok_or(ServiceError::AlreadyRedeemed)?;

        info!(booking_id = %redeemed.id, "Ticket redeemed");
        Ok(redeemed)
    }

    // -------------------------------------------------------------------------
    // Availability overrides
    // -------------------------------------------------------------------------

    /// Create or replace a date override. Blocking a date returns the
    /// bookings on it that still need a reschedule proposal.
    #[instrument(skip(self, actor, input), fields(actor = %actor.sub, tour_id = %input.tour_id))]
    pub async fn save_override(
        &self,
        actor: &AccessTokenClaims,
        input: UpsertAvailabilityOverride,
    ) -> Result<OverrideOutcome, AppError> {
        let tour = self.load_tour(input.tour_id).await?;
        ensure_tour_access(actor, &tour)?;

        if input.custom_capacity.is_some_and(|c| c < 0) {
            return Err(
                ServiceError::Validation("Custom capacity must not be negative".to_string()).into(),
            );
        }

        let saved = self.db.upsert_availability_override(&input).await?;
        let displaced_bookings = if saved.is_blocked {
            self.db
                .find_bookings_displaced_by_block(saved.tour_id, saved.override_date)
                .await?
        } else {
            Vec::new()
        };

        if !displaced_bookings.is_empty() {
            info!(
                tour_id = %saved.tour_id,
                date = %saved.override_date,
                displaced = displaced_bookings.len(),
                "Blocked date has bookings awaiting reschedule"
            );
        }

        Ok(OverrideOutcome {
            availability_override: saved,
            displaced_bookings,
        })
    }

    #[instrument(skip(self, actor), fields(actor = %actor.sub))]
    pub async fn delete_override(
        &self,
        actor: &AccessTokenClaims,
        override_id: Uuid,
    ) -> Result<(), AppError> {
        let existing = self
            .db
            .get_availability_override_by_id(override_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Availability override not found")))?;
        let tour = self.load_tour(existing.tour_id).await?;
        ensure_tour_access(actor, &tour)?;

        self.db.delete_availability_override(override_id).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Retention, coupons, referrals
    // -------------------------------------------------------------------------

    /// Current rates, or the fallback defaults when unconfigured.
    pub async fn retention_rates(&self) -> Result<RetentionRates, AppError> {
        Ok(self
            .db
            .get_retention_config()
            .await?
            .map(|config| config.rates())
            .unwrap_or_default())
    }

    pub async fn update_retention(&self, rates: RetentionRates) -> Result<RetentionConfig, AppError> {
        rates.validate().map_err(ServiceError::Validation)?;
        let config = self.db.upsert_retention_config(&rates).await?;
        info!(
            platform_fee_rate = %config.platform_fee_rate,
            seller_commission_rate = %config.seller_commission_rate,
            tax_rate = %config.tax_rate,
            bank_commission_rate = %config.bank_commission_rate,
            other_retentions_rate = %config.other_retentions_rate,
            "Retention configuration updated"
        );
        Ok(config)
    }

    /// Preview a coupon without consuming a use. Unknown or unusable codes
    /// are `CouponUnavailable`.
    pub async fn preview_coupon(
        &self,
        code: &str,
        tour_id: Option<Uuid>,
        amount: Option<Decimal>,
    ) -> Result<(Coupon, Option<Decimal>), AppError> {
        let coupon = self
            .db
            .get_coupon_by_code(code)
            .await?
            .ok_or(ServiceError::CouponUnavailable)?;

        let business_id = match tour_id {
            Some(tour_id) => self.load_tour(tour_id).await?.business_id,
            None => coupon.business_id,
        };
        if !coupon.is_usable(self.now()) || !coupon.applies_to(business_id) {
            return Err(ServiceError::CouponUnavailable.into());
        }

        let final_amount =
            amount.map(|gross| apply_coupon(gross, coupon.discount_type(), coupon.discount_value));
        Ok((coupon, final_amount))
    }

    pub async fn referral_code(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        Ok(user.referral_code)
    }

    /// Return the caller's referral code, allocating one on first use.
    #[instrument(skip(self))]
    pub async fn generate_referral_code(&self, user_id: Uuid) -> Result<String, AppError> {
        if let Some(code) = self.referral_code(user_id).await? {
            return Ok(code);
        }

        for attempt in 1..=REFERRAL_CODE_ATTEMPTS {
            let code = codes::generate_referral_code();
            match self.db.assign_referral_code(user_id, &code).await {
                Ok(Some(user)) => {
                    info!(user_id = %user_id, "Referral code assigned");
                    return Ok(user.referral_code.unwrap_or(code));
                }
                // Assigned concurrently by another request
                Ok(None) => {
                    if let Some(existing) = self.referral_code(user_id).await? {
                        return Ok(existing);
                    }
                }
                Err(AppError::Conflict(_)) => {
                    warn!(attempt = attempt, "Referral code collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ServiceError::CodeAllocationExhausted.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn tour(capacity: i32) -> Tour {
        Tour {
            id: Uuid::new_v4(),
            business_id: None,
            seller_id: None,
            provider_id: None,
            name: "Sunset sail".to_string(),
            description: None,
            location: "Marina".to_string(),
            price: Decimal::from(60),
            child_price: None,
            capacity,
            departure_time: NaiveTime::from_hms_opt(18, 0, 0),
            duration_minutes: Some(120),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn date_override(tour_id: Uuid, is_blocked: bool, custom_capacity: Option<i32>) -> AvailabilityOverride {
        AvailabilityOverride {
            id: Uuid::new_v4(),
            tour_id,
            override_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            is_blocked,
            custom_capacity,
            reason: Some("Storm warning".to_string()),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn booking(status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            tour_id: Uuid::new_v4(),
            user_id: None,
            customer_name: "Noor".to_string(),
            customer_email: Some("noor@example.com".to_string()),
            customer_phone: None,
            booking_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            adults: 2,
            children: 1,
            gross_amount: Decimal::from(180),
            total_amount: Decimal::from(180),
            discount_source: "none".to_string(),
            coupon_code: None,
            status: status.as_str().to_string(),
            qr_code: "f00d".to_string(),
            alphanumeric_code: "ABCD2345".to_string(),
            reserved_until: None,
            checked_in: false,
            checked_in_at: None,
            redeemed_at: None,
            redeemed_by: None,
            proposed_date: None,
            reschedule_reason: None,
            reschedule_token: None,
            status_before_reschedule: None,
            reminder_sent_at: None,
            review_requested_at: None,
            recovery_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_capacity_without_override() {
        let t = tour(20);
        assert_eq!(effective_capacity(&t, None), (20, false, None));
    }

    #[test]
    fn test_custom_capacity_override() {
        let t = tour(20);
        let o = date_override(t.id, false, Some(8));
        let (capacity, blocked, _) = effective_capacity(&t, Some(&o));
        assert_eq!(capacity, 8);
        assert!(!blocked);

        let o = date_override(t.id, false, None);
        assert_eq!(effective_capacity(&t, Some(&o)).0, 20);
    }

    #[test]
    fn test_blocked_override_has_no_capacity() {
        let t = tour(20);
        let o = date_override(t.id, true, Some(8));
        assert_eq!(
            effective_capacity(&t, Some(&o)),
            (0, true, Some("Storm warning".to_string()))
        );
    }

    #[test]
    fn test_ticket_verdict_confirmed_and_completed_admit() {
        assert!(ticket_verdict(&booking(BookingStatus::Confirmed)).is_ok());
        assert!(ticket_verdict(&booking(BookingStatus::Completed)).is_ok());
    }

    #[test]
    fn test_ticket_verdict_rejections() {
        assert_eq!(
            ticket_verdict(&booking(BookingStatus::Cancelled)),
            Err("Booking is cancelled".to_string())
        );
        assert_eq!(
            ticket_verdict(&booking(BookingStatus::Pending)),
            Err("Booking is not paid".to_string())
        );
        assert!(ticket_verdict(&booking(BookingStatus::PendingReschedule)).is_err());

        let mut redeemed = booking(BookingStatus::Completed);
        redeemed.redeemed_at = Some(Utc::now());
        assert_eq!(
            ticket_verdict(&redeemed),
            Err("Ticket already redeemed".to_string())
        );
    }

    #[test]
    fn test_only_paid_bookings_are_attendable() {
        assert!(ensure_attendable(BookingStatus::Confirmed).is_ok());
        assert!(ensure_attendable(BookingStatus::Completed).is_ok());

        for status in [
            BookingStatus::Pending,
            BookingStatus::PendingPayment,
            BookingStatus::PendingReschedule,
        ] {
            assert!(matches!(
                ensure_attendable(status),
                Err(ServiceError::InvalidTransition { .. })
            ));
        }
        assert!(matches!(
            ensure_attendable(BookingStatus::Refunded),
            Err(ServiceError::BookingVoid(_))
        ));
    }

    #[test]
    fn test_checkout_return_urls() {
        let id = Uuid::new_v4();
        let (success, cancel) = checkout_return_urls("https://book.example", id);
        assert_eq!(
            success,
            format!(
                "https://book.example/bookings/{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
                id
            )
        );
        assert!(success.ends_with("session_id={CHECKOUT_SESSION_ID}"));
        assert_eq!(cancel, format!("https://book.example/bookings/{}/resume", id));
    }

    #[test]
    fn test_reschedule_link() {
        assert_eq!(
            reschedule_link("https://book.example", "abc"),
            "https://book.example/bookings/resolve/abc"
        );
    }

    #[test]
    fn test_past_dates_rejected() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert!(ensure_not_past(today, today).is_ok());
        assert!(ensure_not_past(today.pred_opt().unwrap(), today).is_err());
    }
}
