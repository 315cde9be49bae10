use crate::models::{BookingNotice, NoticeKind};
use crate::services::clock::local_date;
use crate::services::metrics::{JOB_DURATION, NOTIFICATIONS_TOTAL};
use crate::services::{Database, EmailProvider};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Unpaid bookings older than this get a recovery email.
pub const CART_RECOVERY_AFTER_MINUTES: i64 = 60;

/// Dates and cutoffs one sweep run works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepWindows {
    /// Tours departing tomorrow get a reminder.
    pub reminder_date: NaiveDate,
    /// Tours that ran yesterday get a review request.
    pub review_date: NaiveDate,
    pub recovery_cutoff: DateTime<Utc>,
}

impl SweepWindows {
    pub fn at(now: DateTime<Utc>, utc_offset_minutes: i32) -> Self {
        let today = local_date(now, utc_offset_minutes);
        Self {
            reminder_date: today + Duration::days(1),
            review_date: today - Duration::days(1),
            recovery_cutoff: now - Duration::minutes(CART_RECOVERY_AFTER_MINUTES),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub reminders_sent: u64,
    pub review_requests_sent: u64,
    pub recoveries_sent: u64,
    pub holds_released: u64,
    pub failures: u64,
}

/// Runs the reminder, review, cart recovery and seat hold sweeps.
///
/// A booking is stamped only after its email goes out, so a failed send is
/// retried on the next run. One failure never stops the rest of a sweep.
pub struct JobRunner {
    db: Database,
    email: Arc<dyn EmailProvider>,
    public_base_url: String,
    utc_offset_minutes: i32,
}

impl JobRunner {
    pub fn new(
        db: Database,
        email: Arc<dyn EmailProvider>,
        public_base_url: String,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            db,
            email,
            public_base_url,
            utc_offset_minutes,
        }
    }

    #[instrument(skip(self))]
    pub async fn run_all(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for kind in [
            NoticeKind::Reminder,
            NoticeKind::ReviewRequest,
            NoticeKind::CartRecovery,
        ] {
            let (sent, failed) = self.sweep_notices(kind, now).await;

            match kind {
                NoticeKind::Reminder => report.reminders_sent = sent,
                NoticeKind::ReviewRequest => report.review_requests_sent = sent,
                NoticeKind::CartRecovery => report.recoveries_sent = sent,
            }
            report.failures += failed;
        }

        match self.release_expired_holds(now).await {
            Ok(released) => report.holds_released = released,
            Err(e) => {
                error!(error = %e, "Seat hold cleanup failed");
                report.failures += 1;
            }
        }

        info!(
            reminders = report.reminders_sent,
            review_requests = report.review_requests_sent,
            recoveries = report.recoveries_sent,
            holds_released = report.holds_released,
            failures = report.failures,
            "Sweep run finished"
        );

        report
    }

    async fn candidates(
        &self,
        kind: NoticeKind,
        windows: &SweepWindows,
    ) -> Result<Vec<BookingNotice>, AppError> {
        match kind {
            NoticeKind::Reminder => self.db.find_reminder_candidates(windows.reminder_date).await,
            NoticeKind::ReviewRequest => self.db.find_review_candidates(windows.review_date).await,
            NoticeKind::CartRecovery => {
                self.db
                    .find_cart_recovery_candidates(windows.recovery_cutoff)
                    .await
            }
        }
    }

    async fn deliver(&self, kind: NoticeKind, notice: &BookingNotice) -> Result<(), AppError> {
        match kind {
            NoticeKind::Reminder => self.email.send_reminder(notice).await,
            NoticeKind::ReviewRequest => {
                let link = review_link(&self.public_base_url, notice);
                self.email.send_review_request(notice, &link).await
            }
            NoticeKind::CartRecovery => {
                let link = resume_link(&self.public_base_url, notice);
                self.email.send_cart_recovery(notice, &link).await
            }
        }
    }

    /// Delete seat holds that expired at or before `now`.
    pub async fn release_expired_holds(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let timer = JOB_DURATION
            .with_label_values(&["seat_hold_cleanup"])
            .start_timer();
        let released = self.db.delete_expired_seat_holds(now).await;
        timer.observe_duration();
        released
    }

    /// Run one email sweep. Returns (sent, failed).
    pub async fn sweep_notices(&self, kind: NoticeKind, now: DateTime<Utc>) -> (u64, u64) {
        let timer = JOB_DURATION.with_label_values(&[kind.as_str()]).start_timer();
        let outcome = self.deliver_all(kind, now).await;
        timer.observe_duration();
        outcome
    }

    async fn deliver_all(&self, kind: NoticeKind, now: DateTime<Utc>) -> (u64, u64) {
        let windows = SweepWindows::at(now, self.utc_offset_minutes);
        let notices = match self.candidates(kind, &windows).await {
            Ok(notices) => notices,
            Err(e) => {
                error!(error = %e, job = kind.as_str(), "Failed to load sweep candidates");
                return (0, 1);
            }
        };

        let mut sent = 0;
        let mut failed = 0;
        for notice in &notices {
            if let Err(e) = self.deliver(kind, notice).await {
                warn!(error = %e, booking_id = %notice.booking_id, job = kind.as_str(), "Notification failed");
                NOTIFICATIONS_TOTAL
                    .with_label_values(&[kind.as_str(), "failed"])
                    .inc();
                failed += 1;
                continue;
            }

            NOTIFICATIONS_TOTAL
                .with_label_values(&[kind.as_str(), "sent"])
                .inc();
            sent += 1;

            if let Err(e) = self.db.stamp_notice(notice.booking_id, kind, now).await {
                error!(error = %e, booking_id = %notice.booking_id, job = kind.as_str(), "Failed to stamp notification");
                failed += 1;
            }
        }

        (sent, failed)
    }
}

pub fn review_link(base_url: &str, notice: &BookingNotice) -> String {
    format!("{}/bookings/{}/review", base_url, notice.booking_id)
}

pub fn resume_link(base_url: &str, notice: &BookingNotice) -> String {
    format!("{}/bookings/{}/resume", base_url, notice.booking_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn test_windows_in_utc() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 9, 30, 0).unwrap();
        let windows = SweepWindows::at(now, 0);

        assert_eq!(windows.reminder_date, NaiveDate::from_ymd_opt(2026, 5, 11).unwrap());
        assert_eq!(windows.review_date, NaiveDate::from_ymd_opt(2026, 5, 9).unwrap());
        assert_eq!(
            windows.recovery_cutoff,
            Utc.with_ymd_and_hms(2026, 5, 10, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_windows_follow_local_calendar_day() {
        // 23:30 UTC is already the next day at UTC+2
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 23, 30, 0).unwrap();
        let windows = SweepWindows::at(now, 120);

        assert_eq!(windows.reminder_date, NaiveDate::from_ymd_opt(2026, 5, 12).unwrap());
        assert_eq!(windows.review_date, NaiveDate::from_ymd_opt(2026, 5, 10).unwrap());

        // and still the previous day at UTC-5
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 2, 0, 0).unwrap();
        let windows = SweepWindows::at(now, -300);
        assert_eq!(windows.reminder_date, NaiveDate::from_ymd_opt(2026, 5, 10).unwrap());
    }

    #[test]
    fn test_links() {
        let notice = BookingNotice {
            booking_id: Uuid::new_v4(),
            customer_name: "Ada".to_string(),
            customer_email: Some("ada@example.com".to_string()),
            booking_date: NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
            adults: 1,
            children: 0,
            total_amount: Decimal::from(40),
            qr_code: "qr".to_string(),
            alphanumeric_code: "CODE2345".to_string(),
            tour_name: "Old town walk".to_string(),
            tour_location: "Plaza".to_string(),
            departure_time: None,
        };

        assert_eq!(
            review_link("https://book.example", &notice),
            format!("https://book.example/bookings/{}/review", notice.booking_id)
        );
        assert_eq!(
            resume_link("https://book.example", &notice),
            format!("https://book.example/bookings/{}/resume", notice.booking_id)
        );
    }
}
