use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::PaymentOutcome;

/// Checkout initiation request. `reference` is the merchant reference (the
/// storefront passes the order id); when absent the core synthesizes one.
#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    #[validate(email)]
    pub email: String,
    pub reference: Option<String>,
    #[validate(length(min = 7))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(range(min = 0.01))]
    pub amount: f64,
    #[validate(length(min = 1))]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    /// Hosted checkout URL the caller presents to the payer.
    pub redirect_url: String,
    pub reference: String,
    pub order_tracking_id: String,
}

/// IPN query parameters, named as the gateway sends them.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "OrderTrackingId")]
    pub order_tracking_id: String,
    #[serde(rename = "OrderMerchantReference")]
    pub order_merchant_reference: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: PaymentOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub payment_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "trackingId")]
    pub tracking_id: String,
    pub reference: String,
}

/// Poll response. `status` carries either a normalized payment outcome or a
/// gateway-availability status (`gateway_timeout`, `gateway_unreachable`,
/// `gateway_error`) so clients can tell "slow" from "failed".
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub reference: String,
}
