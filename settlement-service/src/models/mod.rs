use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status as stored by the storefront. Serialized as an integer.
///
/// The settlement core performs exactly one forward transition,
/// `AwaitingPayment -> PaidPendingFulfillment`, and never moves status
/// backward. `Fulfilled` is owned by the fulfillment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum OrderStatus {
    AwaitingPayment = 0,
    PaidPendingFulfillment = 1,
    Fulfilled = 2,
}

impl From<OrderStatus> for i32 {
    fn from(status: OrderStatus) -> Self {
        status as i32
    }
}

impl TryFrom<i32> for OrderStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderStatus::AwaitingPayment),
            1 => Ok(OrderStatus::PaidPendingFulfillment),
            2 => Ok(OrderStatus::Fulfilled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Storefront-owned order document. This core reads it and mutates only
/// `status`; `products` and `total` are immutable here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub products: Vec<mongodb::bson::Document>,
    pub total: f64,
    pub status: OrderStatus,
}

/// Internal payment lifecycle state. Set to `Initiated` at creation and
/// mutated only by the callback reconciler.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Completed,
    Failed,
    Cancelled,
    Pending,
}

/// Caller-facing payment classification. The gateway's vocabulary and the
/// storefront's vocabulary differ; this is the closed mapping between them.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl PaymentOutcome {
    /// Normalize the gateway's free-text status description.
    ///
    /// Unrecognized values fail safe into `Pending` instead of propagating
    /// untyped strings or crashing the webhook handler.
    pub fn from_gateway_description(description: &str) -> Self {
        match description.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" => PaymentOutcome::Success,
            "FAILED" | "INVALID" => PaymentOutcome::Failed,
            "REVERSED" => PaymentOutcome::Cancelled,
            _ => PaymentOutcome::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Pending => "pending",
            PaymentOutcome::Success => "success",
            PaymentOutcome::Failed => "failed",
            PaymentOutcome::Cancelled => "cancelled",
        }
    }

    /// The lifecycle state a reconciled outcome maps onto.
    pub fn as_payment_status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Pending => PaymentStatus::Pending,
            PaymentOutcome::Success => PaymentStatus::Completed,
            PaymentOutcome::Failed => PaymentStatus::Failed,
            PaymentOutcome::Cancelled => PaymentStatus::Cancelled,
        }
    }
}

/// One document per gateway submission attempt, successful or not.
///
/// `reference` is the merchant reference: the join key chosen at initiation.
/// `tracking_id` is assigned by the gateway and set at most once.
/// `status_details` holds the last raw gateway payload for audit and is never
/// parsed downstream.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub reference: String,
    pub order_id: Option<String>,
    pub tracking_id: Option<String>,
    pub redirect_url: Option<String>,
    pub status: PaymentStatus,
    pub payment_status: PaymentOutcome,
    pub payment_reference: Option<String>,
    pub error_response: Option<String>,
    pub error_status: Option<i32>,
    pub status_details: Option<serde_json::Value>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
