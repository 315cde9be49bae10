//! Application startup and lifecycle management.

use crate::build_router;
use crate::config::BookingConfig;
use crate::jobs::{IntervalScheduler, JobRunner};
use crate::models::{NewUser, Role};
use crate::services::{
    init_metrics, BookingService, Clock, Database, EmailProvider, JwtService, LifecycleSettings,
    NoopEmailService, PaymentGateway, SmtpEmailService, StripeGateway, SystemClock,
};
use crate::utils::{hash_password, Password};
use crate::AppState;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// External collaborators the service talks to. Tests swap in mocks.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub email: Arc<dyn EmailProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn from_config(config: &BookingConfig) -> Result<Self, AppError> {
        let stripe = StripeGateway::new(config.payment.clone()).map_err(|e| {
            tracing::error!(error = %e, "Failed to create Stripe client");
            AppError::ConfigError(e)
        })?;
        if stripe.is_configured() {
            tracing::info!("Stripe gateway initialized");
        } else {
            tracing::warn!("Stripe secret key not configured - card payments will fail");
        }

        let email: Arc<dyn EmailProvider> = if config.email.enabled {
            Arc::new(SmtpEmailService::new(&config.email)?)
        } else {
            tracing::info!("Email disabled - notifications will be logged only");
            Arc::new(NoopEmailService)
        };

        Ok(Self {
            gateway: Arc::new(stripe),
            email,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    jobs: Arc<JobRunner>,
    clock: Arc<dyn Clock>,
    shutdown_token: CancellationToken,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BookingConfig) -> Result<Self, AppError> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::build_internal(config, collaborators, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: BookingConfig) -> Result<Self, AppError> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::build_internal(config, collaborators, false).await
    }

    /// Build with caller-supplied gateway, email provider and clock.
    pub async fn build_with(
        config: BookingConfig,
        collaborators: Collaborators,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        Self::build_internal(config, collaborators, run_migrations).await
    }

    async fn build_internal(
        config: BookingConfig,
        collaborators: Collaborators,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        bootstrap_admin(&db, &config).await?;

        let bookings = BookingService::new(
            db.clone(),
            collaborators.gateway.clone(),
            collaborators.email.clone(),
            collaborators.clock.clone(),
            LifecycleSettings::from_config(&config),
        );

        let jobs = Arc::new(JobRunner::new(
            db.clone(),
            collaborators.email.clone(),
            config.public_base_url.clone(),
            config.scheduler.utc_offset_minutes,
        ));

        let state = AppState {
            config: config.clone(),
            db,
            jwt: JwtService::new(&config.jwt),
            bookings,
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
        };

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Booking service listener bound");

        Ok(Self {
            port,
            listener,
            state,
            jobs,
            clock: collaborators.clock,
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Sweep runner sharing this application's database and email provider.
    pub fn jobs(&self) -> Arc<JobRunner> {
        self.jobs.clone()
    }

    /// Cancelling stops the scheduler.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let scheduler_config = self.state.config.scheduler.clone();
        if scheduler_config.enabled {
            let scheduler =
                IntervalScheduler::new(Duration::from_secs(scheduler_config.interval_seconds));
            let token = scheduler.shutdown_token();
            let shutdown = self.shutdown_token.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                token.cancel();
            });

            let jobs = self.jobs.clone();
            let clock = self.clock.clone();
            tokio::spawn(scheduler.run(move || {
                let jobs = jobs.clone();
                let now = clock.now();
                async move {
                    jobs.run_all(now).await;
                }
            }));
        } else {
            tracing::info!("Scheduler disabled by configuration");
        }

        let router = build_router(self.state)
            .await
            .map_err(|e| std::io::Error::other(format!("Failed to build router: {}", e)))?;

        tracing::info!(
            service = "booking-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}

/// Create the configured master admin when no user has that username yet.
async fn bootstrap_admin(db: &Database, config: &BookingConfig) -> Result<(), AppError> {
    let Some(admin) = &config.bootstrap_admin else {
        return Ok(());
    };

    if db.get_user_by_username(&admin.username).await?.is_some() {
        tracing::debug!(username = %admin.username, "Bootstrap admin already exists");
        return Ok(());
    }

    let password_hash = hash_password(&Password::new(admin.password.expose_secret().clone()))
        .map_err(AppError::InternalError)?;

    match db
        .create_user(&NewUser {
            username: admin.username.clone(),
            email: None,
            password_hash,
            role: Role::MasterAdmin,
            business_id: None,
        })
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, username = %user.username, "Bootstrap admin created");
            Ok(())
        }
        // Another instance created it first
        Err(AppError::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
