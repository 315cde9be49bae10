pub mod admin;
pub mod auth;
pub mod bookings;
pub mod promotions;
pub mod tickets;
pub mod tours;

use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Money fields are checked here; `validator` has no `Decimal` support.
pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), AppError> {
    if value < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_non_negative() {
        assert!(ensure_non_negative("price", Decimal::ZERO).is_ok());
        assert!(ensure_non_negative("price", Decimal::new(-1, 2)).is_err());
    }
}
