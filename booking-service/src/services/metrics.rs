//! Prometheus metrics for booking-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// HTTP request counter by method, matched route and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register http_requests_total")
});

/// HTTP request duration histogram by method and matched route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "booking_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register http_request_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "booking_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Bookings created, by how the price was discounted.
pub static BOOKINGS_CREATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_bookings_created_total",
        "Total number of bookings created",
        &["discount_source"] // coupon, referral, none
    )
    .expect("Failed to register bookings_created_total")
});

/// Settled payments by method.
pub static PAYMENTS_RECORDED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_payments_recorded_total",
        "Total number of settled payments",
        &["method"] // card, cash
    )
    .expect("Failed to register payments_recorded_total")
});

/// Refund attempts by outcome.
pub static REFUNDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_refunds_total",
        "Total number of refund attempts",
        &["outcome"] // refunded, rejected, error
    )
    .expect("Failed to register refunds_total")
});

/// Notifications by job and outcome.
pub static NOTIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_notifications_total",
        "Total number of notification attempts",
        &["kind", "outcome"]
    )
    .expect("Failed to register notifications_total")
});

/// Sweep duration by job.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "booking_job_duration_seconds",
        "Scheduled sweep duration in seconds",
        &["job"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    )
    .expect("Failed to register job_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&BOOKINGS_CREATED_TOTAL);
    Lazy::force(&PAYMENTS_RECORDED_TOTAL);
    Lazy::force(&REFUNDS_TOTAL);
    Lazy::force(&NOTIFICATIONS_TOTAL);
    Lazy::force(&JOB_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_exported() {
        init_metrics();
        BOOKINGS_CREATED_TOTAL.with_label_values(&["none"]).inc();
        let text = get_metrics();
        assert!(text.contains("booking_bookings_created_total"));
    }
}
