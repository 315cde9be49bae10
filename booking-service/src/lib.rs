//! booking-service: tour bookings, payment settlement and ticketing for BookerOS.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{http_request_span, request_id_middleware},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::BookingConfig;
use crate::middleware::{
    auth_middleware, metrics_middleware, optional_auth_middleware, require_capability, Capability,
};
use crate::services::{BookingService, Database, JwtService};

#[derive(Clone)]
pub struct AppState {
    pub config: BookingConfig,
    pub db: Database,
    pub jwt: JwtService,
    pub bookings: BookingService,
    pub login_rate_limiter: IpRateLimiter,
}

fn requires(capability: Capability, routes: Router<AppState>) -> Router<AppState> {
    routes.route_layer(from_fn_with_state(capability, require_capability))
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Guests may browse and book; a bearer token, when sent, is honoured.
    let guest_routes = Router::new()
        .route("/api/tours", get(handlers::tours::list_tours))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .layer(from_fn_with_state(state.clone(), optional_auth_middleware));

    let public_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/tours/:id", get(handlers::tours::get_tour))
        .route(
            "/api/tours/:id/availability",
            get(handlers::tours::tour_availability),
        )
        .route("/api/seat-holds", post(handlers::tours::create_seat_hold))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/checkout",
            post(handlers::bookings::checkout),
        )
        .route(
            "/api/bookings/:id/verify-payment",
            post(handlers::bookings::verify_payment),
        )
        .route(
            "/api/bookings/qr/:code",
            get(handlers::bookings::ticket_by_qr),
        )
        .route(
            "/api/bookings/resolve/:token",
            get(handlers::bookings::reschedule_details)
                .post(handlers::bookings::resolve_reschedule),
        )
        .route(
            "/api/coupons/validate",
            post(handlers::promotions::validate_coupon),
        );

    let account_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/bookings", get(handlers::bookings::list_bookings))
        .route(
            "/api/referrals/generate",
            post(handlers::promotions::generate_referral_code),
        )
        .route(
            "/api/referrals/my-code",
            get(handlers::promotions::my_referral_code),
        )
        .route(
            "/api/referrals/stats",
            get(handlers::promotions::referral_stats),
        );

    let staff_routes = Router::new()
        .merge(requires(
            Capability::ManageTours,
            Router::new()
                .route("/api/tours", post(handlers::tours::create_tour))
                .route("/api/tours/:id", put(handlers::tours::update_tour)),
        ))
        .merge(requires(
            Capability::ManageAvailability,
            Router::new()
                .route(
                    "/api/availability-overrides",
                    get(handlers::availability::list_overrides)
                        .post(handlers::availability::upsert_override),
                )
                .route(
                    "/api/availability-overrides/:id",
                    delete(handlers::availability::delete_override),
                ),
        ))
        .merge(requires(
            Capability::ProposeReschedule,
            Router::new().route(
                "/api/bookings/:id/propose-reschedule",
                post(handlers::bookings::propose_reschedule),
            ),
        ))
        .merge(requires(
            Capability::CheckIn,
            Router::new()
                .route(
                    "/api/bookings/:id/check-in",
                    post(handlers::bookings::check_in),
                )
                .route(
                    "/api/validate-ticket",
                    post(handlers::tickets::validate_ticket),
                )
                .route(
                    "/api/validate-ticket-code",
                    post(handlers::tickets::validate_ticket_code),
                ),
        ))
        .merge(requires(
            Capability::RedeemTicket,
            Router::new().route("/api/redeem-ticket", post(handlers::tickets::redeem_ticket)),
        ))
        .merge(requires(
            Capability::ConfirmCashPayment,
            Router::new().route(
                "/api/bookings/:id/confirm-cash-payment",
                post(handlers::bookings::confirm_cash_payment),
            ),
        ))
        .merge(requires(
            Capability::ManageCoupons,
            Router::new().route(
                "/api/coupons",
                get(handlers::promotions::list_coupons).post(handlers::promotions::create_coupon),
            ),
        ))
        .merge(requires(
            Capability::ViewFinancialSummary,
            Router::new().route(
                "/api/financial-summary",
                get(handlers::admin::financial_summary),
            ),
        ))
        .merge(requires(
            Capability::ManagePayments,
            Router::new()
                .route("/api/admin/payments", get(handlers::admin::list_payments))
                .route(
                    "/api/admin/payments/:id/refund",
                    post(handlers::admin::refund_payment),
                ),
        ))
        .merge(requires(
            Capability::ManageRetention,
            Router::new().route(
                "/api/admin/retention-config",
                get(handlers::admin::get_retention_config)
                    .put(handlers::admin::update_retention_config),
            ),
        ))
        .merge(requires(
            Capability::ManageBusinesses,
            Router::new().route(
                "/api/businesses",
                get(handlers::admin::list_businesses).post(handlers::admin::create_business),
            ),
        ));

    let protected_routes = Router::new()
        .merge(account_routes)
        .merge(staff_routes)
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let allowed_origins = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(login_route)
        .merge(guest_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(http_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}
