//! Booking Service entry point.

use booking_service::config::BookingConfig;
use booking_service::services::init_metrics;
use booking_service::startup::Application;

use service_core::observability::init_tracing;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let config = BookingConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        otlp_endpoint = ?config.otlp_endpoint,
        "Starting booking-service"
    );

    init_metrics();

    // Secrets stay out of the log
    tracing::info!(
        service_name = %config.service_name,
        environment = ?config.environment,
        http_port = %config.common.port,
        public_base_url = %config.public_base_url,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        currency = %config.payment.currency,
        email_enabled = config.email.enabled,
        scheduler_enabled = config.scheduler.enabled,
        scheduler_interval_seconds = config.scheduler.interval_seconds,
        confirm_on_create = config.booking.confirm_on_create,
        "Configuration loaded"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;
    let shutdown_token = app.shutdown_token();

    tokio::select! {
        result = app.run_until_stopped() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Application error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Graceful shutdown initiated");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Booking service stopped");

    Ok(())
}
