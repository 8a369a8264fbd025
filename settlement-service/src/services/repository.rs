use crate::models::{Order, OrderStatus, Payment, PaymentOutcome, PaymentStatus};
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::options::IndexOptions;
use mongodb::{bson::doc, Collection, Database, IndexModel};

/// Outcome of the forward-only order transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderTransition {
    /// Transitioned `awaiting_payment -> paid_pending_fulfillment`.
    Advanced,
    /// Already at or past `paid_pending_fulfillment`; replay is a no-op.
    AlreadySettled,
    NotFound,
}

/// Persistence seam for `Payment` rows. The reconciler's write is
/// last-write-wins by design: the gateway is the source of truth and every
/// callback re-fetches fresh status. `tracking_id` is never touched after
/// creation.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, payment: Payment) -> Result<()>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>>;

    async fn record_gateway_status(
        &self,
        reference: &str,
        status: PaymentStatus,
        payment_status: PaymentOutcome,
        payment_reference: &str,
        status_details: serde_json::Value,
    ) -> Result<()>;

    /// Completed payments, scanned by the settlement audit sweep.
    async fn completed_payments(&self) -> Result<Vec<Payment>>;
}

/// Read/transition seam for storefront-owned `Order` documents. This core
/// never creates or deletes orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: &str) -> Result<Option<Order>>;

    /// Advance the order to `paid_pending_fulfillment`. Idempotent and
    /// forward-only: an order that already left `awaiting_payment` is left
    /// untouched.
    async fn mark_paid(&self, id: &str) -> Result<OrderTransition>;
}

#[derive(Clone)]
pub struct MongoPaymentStore {
    payments: Collection<Payment>,
}

impl MongoPaymentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            payments: db.collection("payments"),
        }
    }

    /// Unique index on the merchant reference, the join key to `Order`.
    pub async fn init_indexes(&self) -> Result<()> {
        let reference_index = IndexModel::builder()
            .keys(doc! { "reference": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_reference_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.payments.create_index(reference_index, None).await?;

        tracing::info!("Settlement service indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn create_payment(&self, payment: Payment) -> Result<()> {
        self.payments.insert_one(payment, None).await?;
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let filter = doc! { "reference": reference };
        let payment = self.payments.find_one(filter, None).await?;
        Ok(payment)
    }

    async fn record_gateway_status(
        &self,
        reference: &str,
        status: PaymentStatus,
        payment_status: PaymentOutcome,
        payment_reference: &str,
        status_details: serde_json::Value,
    ) -> Result<()> {
        let filter = doc! { "reference": reference };
        let update = doc! {
            "$set": {
                "status": mongodb::bson::to_bson(&status)?,
                "payment_status": mongodb::bson::to_bson(&payment_status)?,
                "payment_reference": payment_reference,
                "status_details": mongodb::bson::to_bson(&status_details)?,
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        self.payments.update_one(filter, update, None).await?;
        Ok(())
    }

    async fn completed_payments(&self) -> Result<Vec<Payment>> {
        let filter = doc! { "status": mongodb::bson::to_bson(&PaymentStatus::Completed)? };
        let cursor = self.payments.find(filter, None).await?;
        let payments: Vec<Payment> = cursor.try_collect().await?;
        Ok(payments)
    }
}

#[derive(Clone)]
pub struct MongoOrderStore {
    orders: Collection<Order>,
}

impl MongoOrderStore {
    pub fn new(db: &Database) -> Self {
        Self {
            orders: db.collection("orders"),
        }
    }
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn find_order(&self, id: &str) -> Result<Option<Order>> {
        let filter = doc! { "_id": id };
        let order = self.orders.find_one(filter, None).await?;
        Ok(order)
    }

    async fn mark_paid(&self, id: &str) -> Result<OrderTransition> {
        // The status filter makes the transition both idempotent and
        // forward-only: a replayed callback matches nothing.
        let filter = doc! {
            "_id": id,
            "status": OrderStatus::AwaitingPayment as i32
        };
        let update = doc! {
            "$set": { "status": OrderStatus::PaidPendingFulfillment as i32 }
        };
        let result = self.orders.update_one(filter, update, None).await?;

        if result.matched_count > 0 {
            return Ok(OrderTransition::Advanced);
        }
        match self.find_order(id).await? {
            Some(_) => Ok(OrderTransition::AlreadySettled),
            None => Ok(OrderTransition::NotFound),
        }
    }
}
