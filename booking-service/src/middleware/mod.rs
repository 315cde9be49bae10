pub mod auth;
pub mod authz;
pub mod metrics;

pub use auth::{auth_middleware, optional_auth_middleware, AuthUser, MaybeAuthUser};
pub use authz::{booking_scope, ensure_tour_access, owning_business, require_capability, Capability};
pub use metrics::metrics_middleware;
