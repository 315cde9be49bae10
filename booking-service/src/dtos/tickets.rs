use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTicketRequest {
    #[validate(length(min = 1, message = "QR code is required"))]
    pub qr_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateTicketCodeRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
}

/// `code` may be the QR token or the alphanumeric backup code.
#[derive(Debug, Deserialize, Validate)]
pub struct RedeemTicketRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
}
