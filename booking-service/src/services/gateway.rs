//! Payment gateway clients.
//!
//! `StripeGateway` drives hosted checkout sessions and refunds over the
//! Stripe REST API. `MockPaymentGateway` keeps sessions in memory for tests.

use crate::config::PaymentConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Hosted checkout request for one booking.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Gateway view of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub session_id: String,
    /// `paid`, `unpaid` or `no_payment_required`.
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    /// Minor units.
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub booking_id: Option<String>,
}

impl SessionStatus {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    pub refund_id: String,
    /// `succeeded`, `pending`, `failed`, `requires_action` or `canceled`.
    pub status: String,
}

impl RefundOutcome {
    /// Refunds still settling count as accepted.
    pub fn accepted(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "pending")
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    async fn verify_payment(&self, session_id: &str) -> Result<SessionStatus>;

    async fn process_refund(&self, payment_intent_id: &str) -> Result<RefundOutcome>;
}

/// Convert a two-decimal amount to integer minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| anyhow!("Amount {} out of range", amount))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: String,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<StripeSession> for SessionStatus {
    fn from(session: StripeSession) -> Self {
        SessionStatus {
            booking_id: session.metadata.get("booking_id").cloned(),
            session_id: session.id,
            payment_status: session.payment_status,
            payment_intent_id: session.payment_intent,
            amount_total: session.amount_total,
            currency: session.currency,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

fn stripe_error(body: &str) -> anyhow::Error {
    match serde_json::from_str::<StripeError>(body) {
        Ok(err) => anyhow!("Stripe error: {} - {}", err.error.kind, err.error.message),
        Err(_) => anyhow!("Stripe error: {}", body),
    }
}

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    config: PaymentConfig,
}

impl StripeGateway {
    pub fn new(config: PaymentConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    /// Check if the secret key is set.
    pub fn is_configured(&self) -> bool {
        !self.config.stripe_secret_key.expose_secret().is_empty()
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(anyhow!("Stripe secret key not configured"))
        }
    }

    async fn read(&self, response: reqwest::Response, operation: &str) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, operation = %operation, "Stripe response");

        if status.is_success() {
            Ok(body)
        } else {
            let err = stripe_error(&body);
            tracing::error!(status = %status, operation = %operation, error = %err, "Stripe request failed");
            Err(err)
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        self.ensure_configured()?;

        let booking_id = request.booking_id.to_string();
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("client_reference_id", booking_id.clone()),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", request.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]",
                to_minor_units(request.amount)?.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
            ("metadata[booking_id]", booking_id.clone()),
            ("payment_intent_data[metadata][booking_id]", booking_id),
        ];
        if let Some(email) = &request.customer_email {
            form.push(("customer_email", email.clone()));
        }

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.stripe_api_base_url))
            .bearer_auth(self.config.stripe_secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let body = self.read(response, "create_checkout_session").await?;
        let session: StripeSession = serde_json::from_str(&body)?;
        let url = session
            .url
            .ok_or_else(|| anyhow!("Stripe session {} has no checkout url", session.id))?;

        tracing::info!(
            session_id = %session.id,
            booking_id = %request.booking_id,
            amount = %request.amount,
            "Checkout session created"
        );

        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn verify_payment(&self, session_id: &str) -> Result<SessionStatus> {
        self.ensure_configured()?;

        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.config.stripe_api_base_url, session_id
            ))
            .bearer_auth(self.config.stripe_secret_key.expose_secret())
            .send()
            .await?;

        let body = self.read(response, "verify_payment").await?;
        let session: StripeSession = serde_json::from_str(&body)?;
        Ok(session.into())
    }

    async fn process_refund(&self, payment_intent_id: &str) -> Result<RefundOutcome> {
        self.ensure_configured()?;

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.config.stripe_api_base_url))
            .bearer_auth(self.config.stripe_secret_key.expose_secret())
            .form(&[("payment_intent", payment_intent_id)])
            .send()
            .await?;

        let body = self.read(response, "process_refund").await?;
        let refund: StripeRefund = serde_json::from_str(&body)?;

        tracing::info!(
            refund_id = %refund.id,
            status = %refund.status,
            payment_intent_id = %payment_intent_id,
            "Refund requested"
        );

        Ok(RefundOutcome {
            refund_id: refund.id,
            status: refund.status,
        })
    }
}

/// In-memory gateway. Sessions start unpaid; tests settle them with
/// [`MockPaymentGateway::mark_paid`].
#[derive(Default)]
pub struct MockPaymentGateway {
    sessions: Mutex<HashMap<String, SessionStatus>>,
    refund_status: Mutex<Option<String>>,
    refunds: Mutex<Vec<String>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session paid and return its payment intent id.
    pub fn mark_paid(&self, session_id: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().ok()?;
        let session = sessions.get_mut(session_id)?;
        let intent = format!("pi_mock_{}", session_id.trim_start_matches("cs_mock_"));
        session.payment_status = "paid".to_string();
        session.payment_intent_id = Some(intent.clone());
        Some(intent)
    }

    /// Status the next refunds report. Defaults to `succeeded`.
    pub fn set_refund_status(&self, status: &str) {
        if let Ok(mut s) = self.refund_status.lock() {
            *s = Some(status.to_string());
        }
    }

    pub fn refunded_intents(&self) -> Vec<String> {
        self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
        let status = SessionStatus {
            session_id: session_id.clone(),
            payment_status: "unpaid".to_string(),
            payment_intent_id: None,
            amount_total: Some(to_minor_units(request.amount)?),
            currency: Some(request.currency.clone()),
            booking_id: Some(request.booking_id.to_string()),
        };
        self.sessions
            .lock()
            .map_err(|_| anyhow!("mock gateway poisoned"))?
            .insert(session_id.clone(), status);

        Ok(CheckoutSession {
            url: format!("https://checkout.mock/{}", session_id),
            session_id,
        })
    }

    async fn verify_payment(&self, session_id: &str) -> Result<SessionStatus> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("mock gateway poisoned"))?
            .get(session_id)
            .cloned()
            .ok_or_else(|| anyhow!("No such checkout session: {}", session_id))
    }

    async fn process_refund(&self, payment_intent_id: &str) -> Result<RefundOutcome> {
        let status = self
            .refund_status
            .lock()
            .map_err(|_| anyhow!("mock gateway poisoned"))?
            .clone()
            .unwrap_or_else(|| "succeeded".to_string());
        self.refunds
            .lock()
            .map_err(|_| anyhow!("mock gateway poisoned"))?
            .push(payment_intent_id.to_string());

        Ok(RefundOutcome {
            refund_id: format!("re_mock_{}", Uuid::new_v4().simple()),
            status,
        })
    }
}
