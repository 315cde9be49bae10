//! Common test utilities for booking-service integration tests.
//!
//! Requires `TEST_DATABASE_URL` pointing at a PostgreSQL database the tests
//! may migrate. Every test builds its own business and tour, so tests can
//! share one database.

#![allow(dead_code)]

use booking_service::config::{
    BookingConfig, BookingRules, BootstrapAdmin, DatabaseConfig, EmailConfig, Environment,
    JwtConfig, PaymentConfig, RateLimitConfig, SchedulerConfig,
};
use booking_service::jobs::JobRunner;
use booking_service::services::{Database, FixedClock, MockEmailService, MockPaymentGateway};
use booking_service::startup::{Application, Collaborators};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub const ADMIN_USERNAME: &str = "bookeros-admin";
pub const ADMIN_PASSWORD: &str = "admin-password-for-tests";
pub const BASE_URL: &str = "https://book.example";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,booking_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Operator "now" for every test: 09:00 UTC on 1 June 2030.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap()
}

pub fn tour_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 10).unwrap()
}

fn test_config(confirm_on_create: bool) -> BookingConfig {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run integration tests");

    BookingConfig {
        common: CommonConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        },
        environment: Environment::Dev,
        service_name: "booking-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        public_base_url: BASE_URL.to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        database: DatabaseConfig {
            url: Secret::new(database_url),
            max_connections: 4,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: Secret::new("integration-test-secret".to_string()),
            expiry_minutes: 60,
        },
        payment: PaymentConfig {
            stripe_secret_key: Secret::new(String::new()),
            stripe_api_base_url: "https://api.stripe.com".to_string(),
            currency: "usd".to_string(),
        },
        email: EmailConfig {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_user: String::new(),
            smtp_password: Secret::new(String::new()),
            from_address: "BookerOS <no-reply@bookeros.local>".to_string(),
        },
        scheduler: SchedulerConfig {
            enabled: false,
            interval_seconds: 3600,
            utc_offset_minutes: 0,
        },
        booking: BookingRules {
            seat_hold_minutes: 15,
            confirm_on_create,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
        },
        bootstrap_admin: Some(BootstrapAdmin {
            username: ADMIN_USERNAME.to_string(),
            password: Secret::new(ADMIN_PASSWORD.to_string()),
        }),
    }
}

/// A running service plus handles on its test doubles.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub gateway: Arc<MockPaymentGateway>,
    pub email: Arc<MockEmailService>,
    pub clock: Arc<FixedClock>,
    pub jobs: Arc<JobRunner>,
    pub db: Database,
    pub admin_token: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(false).await
    }

    pub async fn spawn_with(confirm_on_create: bool) -> Self {
        init_tracing();

        let gateway = Arc::new(MockPaymentGateway::new());
        let email = Arc::new(MockEmailService::new());
        let clock = Arc::new(FixedClock::new(test_now()));

        let collaborators = Collaborators {
            gateway: gateway.clone(),
            email: email.clone(),
            clock: clock.clone(),
        };

        let app = Application::build_with(test_config(confirm_on_create), collaborators, true)
            .await
            .expect("Failed to build application");

        let address = format!("http://127.0.0.1:{}", app.port());
        let jobs = app.jobs();
        let db = app.db().clone();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let admin_token = login(&client, &address, ADMIN_USERNAME, ADMIN_PASSWORD).await;

        TestApp {
            address,
            client,
            gateway,
            email,
            clock,
            jobs,
            db,
            admin_token,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, token: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self.client.put(self.url(path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    /// Register a fresh customer and return their token.
    pub async fn customer_token(&self) -> String {
        let username = format!("customer-{}", Uuid::new_v4().simple());
        let response = self
            .post(
                "/api/auth/register",
                None,
                json!({ "username": username, "password": "customer-password" }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Create a business and a tour belonging to it. Returns the tour id.
    pub async fn create_tour(&self, capacity: i32, price: &str) -> Uuid {
        let business = self
            .post(
                "/api/businesses",
                Some(&self.admin_token),
                json!({ "name": format!("Walks {}", Uuid::new_v4().simple()) }),
            )
            .await;
        assert_eq!(business.status(), 201);
        let business: Value = business.json().await.unwrap();

        let tour = self
            .post(
                "/api/tours",
                Some(&self.admin_token),
                json!({
                    "name": "Old town walk",
                    "location": "Plaza Mayor",
                    "price": price,
                    "capacity": capacity,
                    "businessId": business["id"],
                }),
            )
            .await;
        assert_eq!(tour.status(), 201);
        let tour: Value = tour.json().await.unwrap();
        tour["id"].as_str().unwrap().parse().unwrap()
    }

    /// Book as a guest. Returns the response body.
    pub async fn book(&self, tour_id: Uuid, adults: i32, extra: Value) -> reqwest::Response {
        let mut body = json!({
            "tourId": tour_id,
            "bookingDate": tour_date(),
            "adults": adults,
            "customerName": "Ines Ferreira",
            "customerEmail": "ines@example.com",
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                body.insert(key.clone(), value.clone());
            }
        }
        self.post("/api/bookings", None, body).await
    }

    pub async fn book_ok(&self, tour_id: Uuid, adults: i32) -> Value {
        let response = self.book(tour_id, adults, json!({})).await;
        assert_eq!(response.status(), 201);
        response.json().await.unwrap()
    }

    /// Settle a booking in cash as the master admin.
    pub async fn pay_cash(&self, booking_id: &str) -> Value {
        let response = self
            .post(
                &format!("/api/bookings/{}/confirm-cash-payment", booking_id),
                Some(&self.admin_token),
                json!({}),
            )
            .await;
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }
}

pub async fn login(client: &reqwest::Client, address: &str, username: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Failed to execute login");
    assert_eq!(response.status(), 200, "login failed for {}", username);
    let body: Value = response.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

/// Decimals serialize as strings; compare numerically.
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}
