//! Capability-based authorization.
//!
//! Every role check goes through [`Role::can`]; routes declare the
//! capability they need with [`require_capability`].

use crate::models::{BookingScope, Role, Tour};
use crate::services::AccessTokenClaims;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ManageTours,
    ManageAvailability,
    ProposeReschedule,
    CheckIn,
    RedeemTicket,
    ConfirmCashPayment,
    ManageCoupons,
    ViewFinancialSummary,
    ManagePayments,
    ManageRetention,
    ManageBusinesses,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageTours => "manage_tours",
            Capability::ManageAvailability => "manage_availability",
            Capability::ProposeReschedule => "propose_reschedule",
            Capability::CheckIn => "check_in",
            Capability::RedeemTicket => "redeem_ticket",
            Capability::ConfirmCashPayment => "confirm_cash_payment",
            Capability::ManageCoupons => "manage_coupons",
            Capability::ViewFinancialSummary => "view_financial_summary",
            Capability::ManagePayments => "manage_payments",
            Capability::ManageRetention => "manage_retention",
            Capability::ManageBusinesses => "manage_businesses",
        }
    }
}

impl Role {
    pub fn can(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::MasterAdmin => true,
            Role::Business => matches!(
                capability,
                ManageTours
                    | ManageAvailability
                    | ProposeReschedule
                    | CheckIn
                    | RedeemTicket
                    | ManageCoupons
                    | ViewFinancialSummary
            ),
            Role::Manager => matches!(
                capability,
                ManageTours
                    | ManageAvailability
                    | ProposeReschedule
                    | CheckIn
                    | RedeemTicket
                    | ViewFinancialSummary
            ),
            Role::Seller => matches!(
                capability,
                CheckIn | ConfirmCashPayment | ViewFinancialSummary
            ),
            Role::Customer => false,
        }
    }
}

/// Route layer: `from_fn_with_state(Capability::CheckIn, require_capability)`.
/// Must run inside `auth_middleware`.
pub async fn require_capability(
    State(capability): State<Capability>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<AccessTokenClaims>()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

    if !claims.role.can(capability) {
        tracing::warn!(
            user_id = %claims.sub,
            role = %claims.role.as_str(),
            capability = %capability.as_str(),
            "Capability denied"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Insufficient permissions. Required: {}",
            capability.as_str()
        )));
    }

    Ok(next.run(req).await)
}

/// Bookings (and ledger rows) visible to the caller.
pub fn booking_scope(claims: &AccessTokenClaims) -> BookingScope {
    match claims.role {
        Role::MasterAdmin => BookingScope::All,
        Role::Business | Role::Manager => match claims.business_id {
            Some(business_id) => BookingScope::Business(business_id),
            // Staff without a business see nothing but their own bookings
            None => BookingScope::Customer(claims.sub),
        },
        Role::Seller => BookingScope::Seller(claims.sub),
        Role::Customer => BookingScope::Customer(claims.sub),
    }
}

/// Staff may only act on tours their business owns or they sell.
pub fn ensure_tour_access(claims: &AccessTokenClaims, tour: &Tour) -> Result<(), AppError> {
    let allowed = match claims.role {
        Role::MasterAdmin => true,
        Role::Business | Role::Manager => {
            claims.business_id.is_some() && tour.business_id == claims.business_id
        }
        Role::Seller => tour.seller_id == Some(claims.sub),
        Role::Customer => false,
    };

    if allowed {
        Ok(())
    } else {
        tracing::warn!(user_id = %claims.sub, tour_id = %tour.id, "Tour access denied");
        Err(AppError::Forbidden(anyhow::anyhow!(
            "You do not have access to this tour"
        )))
    }
}

/// Business a staff-created record belongs to. Master admins choose freely;
/// business staff always write into their own business.
pub fn owning_business(
    claims: &AccessTokenClaims,
    requested: Option<Uuid>,
) -> Result<Option<Uuid>, AppError> {
    match claims.role {
        Role::MasterAdmin => Ok(requested),
        Role::Business | Role::Manager => match claims.business_id {
            Some(own) if requested.is_none() || requested == Some(own) => Ok(Some(own)),
            Some(_) => Err(AppError::Forbidden(anyhow::anyhow!(
                "Cannot act on behalf of another business"
            ))),
            None => Err(AppError::Forbidden(anyhow::anyhow!(
                "Account is not linked to a business"
            ))),
        },
        Role::Seller | Role::Customer => Err(AppError::Forbidden(anyhow::anyhow!(
            "Insufficient permissions"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware::from_fn_with_state, routing::get, Router};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    fn claims(role: Role, business_id: Option<Uuid>) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: Uuid::new_v4(),
            username: "staff".to_string(),
            role,
            business_id,
            exp: 0,
            iat: 0,
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn tour(business_id: Option<Uuid>, seller_id: Option<Uuid>) -> Tour {
        Tour {
            id: Uuid::new_v4(),
            business_id,
            seller_id,
            provider_id: None,
            name: "Reef snorkel".to_string(),
            description: None,
            location: "North beach".to_string(),
            price: Decimal::from(80),
            child_price: None,
            capacity: 12,
            departure_time: None,
            duration_minutes: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_capability_table() {
        use Capability::*;

        assert!(Role::Seller.can(ConfirmCashPayment));
        assert!(Role::MasterAdmin.can(ConfirmCashPayment));
        assert!(!Role::Business.can(ConfirmCashPayment));

        assert!(Role::Business.can(RedeemTicket));
        assert!(Role::Manager.can(RedeemTicket));
        assert!(!Role::Seller.can(RedeemTicket));

        assert!(Role::Business.can(ManageCoupons));
        assert!(!Role::Manager.can(ManageCoupons));

        for cap in [ManagePayments, ManageRetention, ManageBusinesses] {
            assert!(Role::MasterAdmin.can(cap));
            assert!(!Role::Business.can(cap));
            assert!(!Role::Seller.can(cap));
        }

        for cap in [CheckIn, ViewFinancialSummary, ManageTours] {
            assert!(!Role::Customer.can(cap));
        }
    }

    #[test]
    fn test_booking_scope_by_role() {
        let business = Uuid::new_v4();
        assert_eq!(booking_scope(&claims(Role::MasterAdmin, None)), BookingScope::All);
        assert_eq!(
            booking_scope(&claims(Role::Manager, Some(business))),
            BookingScope::Business(business)
        );

        let seller = claims(Role::Seller, None);
        assert_eq!(booking_scope(&seller), BookingScope::Seller(seller.sub));

        let customer = claims(Role::Customer, None);
        assert_eq!(booking_scope(&customer), BookingScope::Customer(customer.sub));
    }

    #[test]
    fn test_tour_access() {
        let business = Uuid::new_v4();
        let owner = claims(Role::Business, Some(business));
        let outsider = claims(Role::Business, Some(Uuid::new_v4()));
        let seller = claims(Role::Seller, None);

        assert!(ensure_tour_access(&owner, &tour(Some(business), None)).is_ok());
        assert!(ensure_tour_access(&outsider, &tour(Some(business), None)).is_err());
        assert!(ensure_tour_access(&seller, &tour(Some(business), Some(seller.sub))).is_ok());
        assert!(ensure_tour_access(&seller, &tour(Some(business), None)).is_err());
        assert!(ensure_tour_access(&claims(Role::MasterAdmin, None), &tour(None, None)).is_ok());
        assert!(ensure_tour_access(&claims(Role::Manager, None), &tour(None, None)).is_err());
    }

    #[test]
    fn test_owning_business() {
        let business = Uuid::new_v4();
        let other = Uuid::new_v4();

        let admin = claims(Role::MasterAdmin, None);
        assert_eq!(owning_business(&admin, Some(other)).unwrap(), Some(other));
        assert_eq!(owning_business(&admin, None).unwrap(), None);

        let staff = claims(Role::Manager, Some(business));
        assert_eq!(owning_business(&staff, None).unwrap(), Some(business));
        assert_eq!(owning_business(&staff, Some(business)).unwrap(), Some(business));
        assert!(owning_business(&staff, Some(other)).is_err());

        assert!(owning_business(&claims(Role::Business, None), None).is_err());
        assert!(owning_business(&claims(Role::Seller, None), None).is_err());
    }

    fn app() -> Router {
        Router::new()
            .route("/refunds", get(|| async { "ok" }))
            .route_layer(from_fn_with_state(
                Capability::ManagePayments,
                require_capability,
            ))
    }

    fn request_with(claims: Option<AccessTokenClaims>) -> Request {
        let mut req = Request::builder().uri("/refunds").body(Body::empty()).unwrap();
        if let Some(claims) = claims {
            req.extensions_mut().insert(claims);
        }
        req
    }

    #[tokio::test]
    async fn test_require_capability() {
        let admin = app()
            .oneshot(request_with(Some(claims(Role::MasterAdmin, None))))
            .await
            .unwrap();
        assert_eq!(admin.status(), StatusCode::OK);

        let seller = app()
            .oneshot(request_with(Some(claims(Role::Seller, None))))
            .await
            .unwrap();
        assert_eq!(seller.status(), StatusCode::FORBIDDEN);

        let anonymous = app().oneshot(request_with(None)).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    }
}
