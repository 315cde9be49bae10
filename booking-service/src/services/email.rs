use crate::config::EmailConfig;
use crate::models::BookingNotice;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

/// Customer emails sent by booking-service.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_booking_confirmation(&self, notice: &BookingNotice) -> Result<(), AppError>;

    async fn send_reminder(&self, notice: &BookingNotice) -> Result<(), AppError>;

    async fn send_review_request(
        &self,
        notice: &BookingNotice,
        review_link: &str,
    ) -> Result<(), AppError>;

    async fn send_cart_recovery(
        &self,
        notice: &BookingNotice,
        resume_link: &str,
    ) -> Result<(), AppError>;
}

fn recipient(notice: &BookingNotice) -> Result<&str, AppError> {
    notice
        .customer_email
        .as_deref()
        .ok_or_else(|| AppError::EmailError("Booking has no customer email".to_string()))
}

fn departure(notice: &BookingNotice) -> String {
    match notice.departure_time {
        Some(time) => format!("{} at {}", notice.booking_date, time.format("%H:%M")),
        None => notice.booking_date.to_string(),
    }
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &EmailConfig) -> Result<Self, AppError> {
        let mut builder = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .timeout(Some(Duration::from_secs(10)));

        if !config.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.expose_secret().clone(),
            ));
        }

        tracing::info!(host = %config.smtp_host, "Email service initialized with SMTP relay");

        Ok(Self {
            mailer: builder.build(),
            from_email: config.from_address.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(plain_body)?;

        // lettre's SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_booking_confirmation(&self, notice: &BookingNotice) -> Result<(), AppError> {
        let body = format!(
            "Hi {},\n\nYour booking for {} ({}) on {} is registered.\n\
             Guests: {} adults, {} children\nTotal: {}\n\n\
             Ticket code: {}\nQR reference: {}\n\n\
             Show the QR code or the ticket code at check-in.",
            notice.customer_name,
            notice.tour_name,
            notice.tour_location,
            departure(notice),
            notice.adults,
            notice.children,
            notice.total_amount,
            notice.alphanumeric_code,
            notice.qr_code,
        );
        self.send_email(recipient(notice)?, "Your booking", body).await
    }

    async fn send_reminder(&self, notice: &BookingNotice) -> Result<(), AppError> {
        let body = format!(
            "Hi {},\n\nThis is a reminder that {} departs {} from {}.\n\n\
             Ticket code: {}",
            notice.customer_name,
            notice.tour_name,
            departure(notice),
            notice.tour_location,
            notice.alphanumeric_code,
        );
        self.send_email(recipient(notice)?, "Your tour is tomorrow", body)
            .await
    }

    async fn send_review_request(
        &self,
        notice: &BookingNotice,
        review_link: &str,
    ) -> Result<(), AppError> {
        let body = format!(
            "Hi {},\n\nThanks for joining {}. We'd love to hear how it went:\n\n{}",
            notice.customer_name, notice.tour_name, review_link,
        );
        self.send_email(recipient(notice)?, "How was your tour?", body)
            .await
    }

    async fn send_cart_recovery(
        &self,
        notice: &BookingNotice,
        resume_link: &str,
    ) -> Result<(), AppError> {
        let body = format!(
            "Hi {},\n\nYour booking for {} on {} is not paid yet. \
             You can finish it here:\n\n{}",
            notice.customer_name, notice.tour_name, notice.booking_date, resume_link,
        );
        self.send_email(recipient(notice)?, "Complete your booking", body)
            .await
    }
}

/// Used when `EMAIL_ENABLED=false`; logs instead of sending.
#[derive(Clone, Default)]
pub struct NoopEmailService;

#[async_trait]
impl EmailProvider for NoopEmailService {
    async fn send_booking_confirmation(&self, notice: &BookingNotice) -> Result<(), AppError> {
        tracing::debug!(booking_id = %notice.booking_id, "Email disabled, skipping confirmation");
        Ok(())
    }

    async fn send_reminder(&self, notice: &BookingNotice) -> Result<(), AppError> {
        tracing::debug!(booking_id = %notice.booking_id, "Email disabled, skipping reminder");
        Ok(())
    }

    async fn send_review_request(
        &self,
        notice: &BookingNotice,
        _review_link: &str,
    ) -> Result<(), AppError> {
        tracing::debug!(booking_id = %notice.booking_id, "Email disabled, skipping review request");
        Ok(())
    }

    async fn send_cart_recovery(
        &self,
        notice: &BookingNotice,
        _resume_link: &str,
    ) -> Result<(), AppError> {
        tracing::debug!(booking_id = %notice.booking_id, "Email disabled, skipping cart recovery");
        Ok(())
    }
}

/// A message captured by [`MockEmailService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub kind: &'static str,
    pub to: String,
    pub booking_id: uuid::Uuid,
    pub link: Option<String>,
}

/// Records every message; can be told to fail for a recipient.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
    failing_recipient: Option<String>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipient: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_recipient: Some(recipient.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(
        &self,
        kind: &'static str,
        notice: &BookingNotice,
        link: Option<&str>,
    ) -> Result<(), AppError> {
        let to = recipient(notice)?.to_string();
        if self.failing_recipient.as_deref() == Some(to.as_str()) {
            return Err(AppError::EmailError(format!("Mailbox unavailable: {}", to)));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentEmail {
                kind,
                to,
                booking_id: notice.booking_id,
                link: link.map(str::to_string),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_booking_confirmation(&self, notice: &BookingNotice) -> Result<(), AppError> {
        self.record("confirmation", notice, None)
    }

    async fn send_reminder(&self, notice: &BookingNotice) -> Result<(), AppError> {
        self.record("reminder", notice, None)
    }

    async fn send_review_request(
        &self,
        notice: &BookingNotice,
        review_link: &str,
    ) -> Result<(), AppError> {
        self.record("review_request", notice, Some(review_link))
    }

    async fn send_cart_recovery(
        &self,
        notice: &BookingNotice,
        resume_link: &str,
    ) -> Result<(), AppError> {
        self.record("cart_recovery", notice, Some(resume_link))
    }
}
